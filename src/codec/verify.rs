//! The verifier: walks a message value and reports the first violation of
//! its declared types, with the dotted field path from the root.

use crate::error::{VerifyError, VerifyReason};
use crate::value::{MsgValue, Value};

use super::{Codec, FieldPlan, PlanType};
use crate::schema::Occurrence;

impl Codec {
    /// Validates `msg` against its message definition.
    ///
    /// Always active when called directly, independent of the negotiated
    /// encode-time verification mode.
    pub fn verify_msg(&self, msg: &MsgValue) -> Result<(), VerifyError> {
        match self.msg_plan_index(&msg.name) {
            Some(idx) => self.verify_at(idx, msg, &mut Vec::new()),
            None => Err(verify_error(
                &[],
                VerifyReason::WrongType {
                    expected: "a defined message type",
                },
                &msg.name,
            )),
        }
    }

    fn verify_at(
        &self,
        idx: usize,
        msg: &MsgValue,
        path: &mut Vec<String>,
    ) -> Result<(), VerifyError> {
        let plan = &self.msgs[idx];
        if msg.name != plan.name || msg.fields.len() != plan.fields.len() {
            return Err(verify_error(path, VerifyReason::BadShape, msg));
        }

        for field in &plan.fields {
            let slot = msg.fields[(field.rnum - 1) as usize].as_ref();
            match (field.occurrence, slot) {
                (Occurrence::Required, None) => {
                    path.push(field.name.clone());
                    return Err(verify_error(path, VerifyReason::MissingRequired, &"absent"));
                }
                (_, None) => {}
                (Occurrence::Repeated, Some(value)) => {
                    let Value::List(items) = value else {
                        path.push(field.name.clone());
                        return Err(verify_error(
                            path,
                            VerifyReason::WrongType {
                                expected: "a repeated-field list",
                            },
                            value,
                        ));
                    };
                    for (i, item) in items.iter().enumerate() {
                        path.push(format!("{}[{}]", field.name, i));
                        self.verify_value(field, item, path)?;
                        path.pop();
                    }
                }
                (_, Some(value)) => {
                    path.push(field.name.clone());
                    self.verify_value(field, value, path)?;
                    path.pop();
                }
            }
        }
        Ok(())
    }

    fn verify_value(
        &self,
        field: &FieldPlan,
        value: &Value,
        path: &mut Vec<String>,
    ) -> Result<(), VerifyError> {
        match &field.ty {
            PlanType::Int32 | PlanType::Sint32 | PlanType::Sfixed32 => {
                verify_int(field, value, path, i64::from(i32::MIN), i64::from(i32::MAX))
            }
            PlanType::Int64 | PlanType::Sint64 | PlanType::Sfixed64 => {
                verify_int(field, value, path, i64::MIN, i64::MAX)
            }
            PlanType::Uint32 | PlanType::Fixed32 => {
                verify_uint(field, value, path, u64::from(u32::MAX))
            }
            PlanType::Uint64 | PlanType::Fixed64 => verify_uint(field, value, path, u64::MAX),
            PlanType::Bool => match value {
                Value::Bool(_) => Ok(()),
                _ => Err(wrong_type(path, "bool", value)),
            },
            // Floating fields are satisfied by any numeric value;
            // integers are interpreted as their floating value.
            PlanType::Float | PlanType::Double => match value {
                Value::Double(_) | Value::Int(_) | Value::Uint(_) => Ok(()),
                _ => Err(wrong_type(path, field.ty.kind_name(), value)),
            },
            PlanType::Str => match value {
                // A Rust string is valid UTF-8 by construction.
                Value::Str(_) => Ok(()),
                _ => Err(wrong_type(path, "string", value)),
            },
            PlanType::Bytes => match value {
                Value::Bytes(_) => Ok(()),
                _ => Err(wrong_type(path, "bytes", value)),
            },
            PlanType::Enum(ei) => match value {
                Value::Enum(symbol) if self.enums[*ei].by_symbol.contains_key(symbol) => Ok(()),
                Value::Enum(_) => Err(verify_error(path, VerifyReason::BadEnumSymbol, value)),
                _ => Err(wrong_type(path, "an enum symbol", value)),
            },
            PlanType::Msg(mi) => match value {
                Value::Msg(sub) => self.verify_at(*mi, sub, path),
                _ => Err(wrong_type(path, "a message value", value)),
            },
        }
    }
}

fn verify_int(
    field: &FieldPlan,
    value: &Value,
    path: &[String],
    min: i64,
    max: i64,
) -> Result<(), VerifyError> {
    match value {
        Value::Int(i) if (min..=max).contains(i) => Ok(()),
        Value::Uint(u) if *u <= max as u64 => Ok(()),
        Value::Int(_) | Value::Uint(_) => Err(verify_error(
            path,
            VerifyReason::OutOfRange {
                ty: field.ty.kind_name(),
            },
            value,
        )),
        _ => Err(wrong_type(path, field.ty.kind_name(), value)),
    }
}

fn verify_uint(
    field: &FieldPlan,
    value: &Value,
    path: &[String],
    max: u64,
) -> Result<(), VerifyError> {
    match value {
        Value::Uint(u) if *u <= max => Ok(()),
        Value::Int(i) if *i >= 0 && *i as u64 <= max => Ok(()),
        Value::Int(_) | Value::Uint(_) => Err(verify_error(
            path,
            VerifyReason::OutOfRange {
                ty: field.ty.kind_name(),
            },
            value,
        )),
        _ => Err(wrong_type(path, field.ty.kind_name(), value)),
    }
}

fn wrong_type(path: &[String], expected: &'static str, value: &impl std::fmt::Debug) -> VerifyError {
    verify_error(path, VerifyReason::WrongType { expected }, value)
}

fn verify_error(
    path: &[String],
    reason: VerifyReason,
    value: &impl std::fmt::Debug,
) -> VerifyError {
    VerifyError {
        reason,
        value: format!("{:?}", value),
        path: if path.is_empty() {
            "<root>".to_string()
        } else {
            path.join(".")
        },
    }
}

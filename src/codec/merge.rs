//! The merger: combines two values of one message type under the proto2
//! merge rules.

use crate::schema::Occurrence;
use crate::value::{MsgValue, Value};

use super::{Codec, PlanType};

impl Codec {
    /// Merges `new` into `prev`, producing the combined value.
    ///
    /// Per field: an absent side loses; when both are present, scalars
    /// and enums take `new`, sub-messages merge recursively, and repeated
    /// fields concatenate `prev ++ new`. Merging with an all-absent value
    /// is the identity.
    ///
    /// Dispatches on the shared message identity of the two arguments;
    /// passing values of different types is a caller contract violation.
    pub fn merge_msgs(&self, prev: &MsgValue, new: &MsgValue) -> MsgValue {
        debug_assert_eq!(
            prev.name, new.name,
            "merge_msgs dispatches on a shared message identity"
        );
        match self.msg_plan_index(&prev.name) {
            Some(idx) => self.merge_values(idx, prev, new),
            None => new.clone(),
        }
    }

    fn merge_values(&self, idx: usize, prev: &MsgValue, new: &MsgValue) -> MsgValue {
        let plan = &self.msgs[idx];
        let mut out = self.empty_msg(idx);
        for field in &plan.fields {
            let slot_idx = (field.rnum - 1) as usize;
            let p = prev.fields.get(slot_idx).and_then(Option::as_ref);
            let n = new.fields.get(slot_idx).and_then(Option::as_ref);
            out.fields[slot_idx] = match (p, n) {
                (None, None) => None,
                (Some(v), None) | (None, Some(v)) => Some(v.clone()),
                (Some(pv), Some(nv)) => Some(match (field.occurrence, &field.ty) {
                    (Occurrence::Repeated, _) => match (pv, nv) {
                        (Value::List(a), Value::List(b)) => {
                            Value::List(a.iter().chain(b).cloned().collect())
                        }
                        _ => nv.clone(),
                    },
                    (_, PlanType::Msg(mi)) => match (pv, nv) {
                        (Value::Msg(a), Value::Msg(b)) => Value::Msg(self.merge_values(*mi, a, b)),
                        _ => nv.clone(),
                    },
                    // Scalars and enums: new wins.
                    _ => nv.clone(),
                }),
            };
        }
        out
    }
}

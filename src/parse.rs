//! The `.proto` parser collaborator.
//!
//! Parses the proto2 subset the pipeline consumes into raw definitions:
//! `package`, `import`, `message` (with nesting), `enum`, `extend`, and
//! field declarations with `packed`/`default` options. Unknown options
//! and `reserved`/`extensions` statements are parsed and dropped;
//! comments are whitespace. proto3 input is rejected.

use nom::branch::alt;
use nom::bytes::complete::{tag, tag_no_case, take_until, take_while, take_while1};
use nom::character::complete::{char, digit1, hex_digit1, multispace1, oct_digit1, one_of};
use nom::combinator::{cut, map, map_res, opt, recognize, value};
use nom::multi::{many0, separated_list1};
use nom::sequence::{delimited, pair, preceded, tuple};
use nom::IResult;

use crate::ast::{Decl, EnumAst, ExtendAst, FieldAst, Literal, MessageAst, OptAst, ProtoFile, TypeAst};
use crate::schema::{FieldType, Occurrence};

type PResult<'a, T> = IResult<&'a str, T>;

/// Where and why a file failed to parse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseDetail {
    pub line: usize,
    pub detail: String,
}

/// Parses one `.proto` source text into raw definitions.
pub fn parse_proto(src: &str) -> Result<ProtoFile, ParseDetail> {
    let parsed: PResult<'_, (Option<String>, Vec<FileItem>)> =
        pair(opt(syntax_stmt), many0(file_item))(src);
    let (rest, (syntax, items)) = match parsed {
        Ok(ok) => ok,
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            return Err(detail_at(src, e.input, "syntax error"));
        }
        Err(nom::Err::Incomplete(_)) => {
            return Err(ParseDetail {
                line: 1,
                detail: "incomplete input".to_string(),
            });
        }
    };

    let rest = match ws(rest) {
        Ok((rest, ())) => rest,
        Err(_) => rest,
    };
    if !rest.is_empty() {
        return Err(detail_at(src, rest, "unexpected input"));
    }

    if let Some(syntax) = &syntax {
        if syntax != "proto2" {
            return Err(ParseDetail {
                line: 1,
                detail: format!("unsupported syntax {:?}", syntax),
            });
        }
    }

    let mut file = ProtoFile {
        package: None,
        imports: Vec::new(),
        decls: Vec::new(),
    };
    for item in items {
        match item {
            FileItem::Package(p) => file.package = Some(p),
            FileItem::Import(p) => file.imports.push(p),
            FileItem::Decl(d) => file.decls.push(d),
            FileItem::Nothing => {}
        }
    }
    Ok(file)
}

/// A cheap pre-parse scan that catches tokenization-level problems:
/// unterminated strings and block comments. Grammar errors are left to
/// the parser proper.
pub(crate) fn scan_check(src: &str) -> Result<(), String> {
    #[derive(Clone, Copy)]
    enum State {
        Normal,
        Line,
        Block(usize),
        Str(usize),
    }

    let mut line = 1usize;
    let mut state = State::Normal;
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            line += 1;
        }
        match state {
            State::Normal => match c {
                '/' => match chars.peek() {
                    Some('/') => {
                        chars.next();
                        state = State::Line;
                    }
                    Some('*') => {
                        chars.next();
                        state = State::Block(line);
                    }
                    _ => {}
                },
                '"' => state = State::Str(line),
                _ => {}
            },
            State::Line => {
                if c == '\n' {
                    state = State::Normal;
                }
            }
            State::Block(_) => {
                if c == '*' && chars.peek() == Some(&'/') {
                    chars.next();
                    state = State::Normal;
                }
            }
            State::Str(start) => match c {
                '\\' => {
                    chars.next();
                }
                '"' => state = State::Normal,
                '\n' => return Err(format!("unterminated string starting on line {}", start)),
                _ => {}
            },
        }
    }
    match state {
        State::Normal | State::Line => Ok(()),
        State::Block(start) => Err(format!(
            "unterminated block comment starting on line {}",
            start
        )),
        State::Str(start) => Err(format!("unterminated string starting on line {}", start)),
    }
}

fn detail_at(src: &str, rest: &str, what: &str) -> ParseDetail {
    let consumed = src.len() - rest.len();
    let line = src[..consumed].matches('\n').count() + 1;
    ParseDetail {
        line,
        detail: what.to_string(),
    }
}

enum FileItem {
    Package(String),
    Import(String),
    Decl(Decl),
    Nothing,
}

fn file_item(i: &str) -> PResult<'_, FileItem> {
    alt((
        map(package_stmt, FileItem::Package),
        map(import_stmt, FileItem::Import),
        map(message, |m| FileItem::Decl(Decl::Message(m))),
        map(enum_def, |e| FileItem::Decl(Decl::Enum(e))),
        map(extend, |x| FileItem::Decl(Decl::Extend(x))),
        map(option_stmt, |_| FileItem::Nothing),
        map(sym(";"), |_| FileItem::Nothing),
    ))(i)
}

fn syntax_stmt(i: &str) -> PResult<'_, String> {
    let (i, _) = keyword("syntax")(i)?;
    let (i, (_, syntax, _)) = cut(tuple((sym("="), str_lit, sym(";"))))(i)?;
    Ok((i, syntax))
}

fn package_stmt(i: &str) -> PResult<'_, String> {
    let (i, _) = keyword("package")(i)?;
    let (i, (name, _)) = cut(pair(qualified, sym(";")))(i)?;
    Ok((i, name))
}

fn import_stmt(i: &str) -> PResult<'_, String> {
    let (i, _) = keyword("import")(i)?;
    let (i, (_, name, _)) = cut(tuple((
        opt(alt((keyword("public"), keyword("weak")))),
        str_lit,
        sym(";"),
    )))(i)?;
    Ok((i, name))
}

fn message(i: &str) -> PResult<'_, MessageAst> {
    let (i, _) = keyword("message")(i)?;
    let (i, (name, _, items, _)) =
        cut(tuple((ident, sym("{"), many0(message_item), sym("}"))))(i)?;
    let mut msg = MessageAst {
        name,
        fields: Vec::new(),
        messages: Vec::new(),
        enums: Vec::new(),
        extends: Vec::new(),
    };
    for item in items {
        match item {
            MessageItem::Field(f) => msg.fields.push(f),
            MessageItem::Message(m) => msg.messages.push(m),
            MessageItem::Enum(e) => msg.enums.push(e),
            MessageItem::Extend(x) => msg.extends.push(x),
            MessageItem::Nothing => {}
        }
    }
    Ok((i, msg))
}

enum MessageItem {
    Field(FieldAst),
    Message(MessageAst),
    Enum(EnumAst),
    Extend(ExtendAst),
    Nothing,
}

fn message_item(i: &str) -> PResult<'_, MessageItem> {
    alt((
        map(message, MessageItem::Message),
        map(enum_def, MessageItem::Enum),
        map(extend, MessageItem::Extend),
        map(option_stmt, |_| MessageItem::Nothing),
        map(reserved_stmt, |_| MessageItem::Nothing),
        map(extensions_stmt, |_| MessageItem::Nothing),
        map(sym(";"), |_| MessageItem::Nothing),
        map(field, MessageItem::Field),
    ))(i)
}

fn enum_def(i: &str) -> PResult<'_, EnumAst> {
    let (i, _) = keyword("enum")(i)?;
    let (i, (name, _, entries, _)) =
        cut(tuple((ident, sym("{"), many0(enum_entry), sym("}"))))(i)?;
    Ok((
        i,
        EnumAst {
            name,
            values: entries.into_iter().flatten().collect(),
        },
    ))
}

fn enum_entry(i: &str) -> PResult<'_, Option<(String, i32)>> {
    alt((
        map(option_stmt, |_| None),
        map(sym(";"), |_| None),
        enum_value,
    ))(i)
}

fn enum_value(i: &str) -> PResult<'_, Option<(String, i32)>> {
    let (i, name) = ident(i)?;
    let (i, (_, number, _, _)) = cut(tuple((sym("="), int_lit, field_opts, sym(";"))))(i)?;
    let number = match i32::try_from(number) {
        Ok(n) => n,
        Err(_) => return Err(failure(i)),
    };
    Ok((i, Some((name, number))))
}

fn extend(i: &str) -> PResult<'_, ExtendAst> {
    let (i, _) = keyword("extend")(i)?;
    let (i, (target, _, items, _)) =
        cut(tuple((qualified, sym("{"), many0(extend_item), sym("}"))))(i)?;
    Ok((
        i,
        ExtendAst {
            target,
            fields: items.into_iter().flatten().collect(),
        },
    ))
}

fn extend_item(i: &str) -> PResult<'_, Option<FieldAst>> {
    alt((map(sym(";"), |_| None), map(field, Some)))(i)
}

fn field(i: &str) -> PResult<'_, FieldAst> {
    let (i, occurrence) = occurrence(i)?;
    let (i, (ty_name, name, _, fnum, opts, _)) = cut(tuple((
        qualified,
        ident,
        sym("="),
        int_lit,
        field_opts,
        sym(";"),
    )))(i)?;
    let fnum = match u32::try_from(fnum) {
        Ok(n) => n,
        Err(_) => return Err(failure(i)),
    };
    let ty = match scalar_type(&ty_name) {
        Some(scalar) => TypeAst::Scalar(scalar),
        None => TypeAst::Named(ty_name),
    };
    Ok((
        i,
        FieldAst {
            name,
            fnum,
            ty,
            occurrence,
            opts,
        },
    ))
}

fn occurrence(i: &str) -> PResult<'_, Occurrence> {
    alt((
        value(Occurrence::Required, keyword("required")),
        value(Occurrence::Optional, keyword("optional")),
        value(Occurrence::Repeated, keyword("repeated")),
    ))(i)
}

fn field_opts(i: &str) -> PResult<'_, Vec<OptAst>> {
    map(
        opt(delimited(
            sym("["),
            separated_list1(sym(","), field_opt),
            sym("]"),
        )),
        |opts| opts.unwrap_or_default(),
    )(i)
}

fn field_opt(i: &str) -> PResult<'_, OptAst> {
    let (i, name) = qualified(i)?;
    let (i, _) = sym("=")(i)?;
    let (i, lit) = literal(i)?;
    let parsed = match (name.as_str(), lit) {
        ("packed", Literal::Bool(b)) => OptAst::Packed(b),
        ("default", lit) => OptAst::Default(lit),
        (_, _) => OptAst::Other(name),
    };
    Ok((i, parsed))
}

/// `option ... ;` — tolerated and dropped, at file, message, and enum level.
fn option_stmt(i: &str) -> PResult<'_, ()> {
    let (i, _) = keyword("option")(i)?;
    let (i, _) = cut(pair(take_while(|c| c != ';'), sym(";")))(i)?;
    Ok((i, ()))
}

fn reserved_stmt(i: &str) -> PResult<'_, ()> {
    let (i, _) = keyword("reserved")(i)?;
    let (i, _) = cut(pair(take_while(|c| c != ';'), sym(";")))(i)?;
    Ok((i, ()))
}

fn extensions_stmt(i: &str) -> PResult<'_, ()> {
    let (i, _) = keyword("extensions")(i)?;
    let (i, _) = cut(pair(take_while(|c| c != ';'), sym(";")))(i)?;
    Ok((i, ()))
}

fn scalar_type(name: &str) -> Option<FieldType> {
    Some(match name {
        "sint32" => FieldType::Sint32,
        "sint64" => FieldType::Sint64,
        "int32" => FieldType::Int32,
        "int64" => FieldType::Int64,
        "uint32" => FieldType::Uint32,
        "uint64" => FieldType::Uint64,
        "bool" => FieldType::Bool,
        "fixed32" => FieldType::Fixed32,
        "sfixed32" => FieldType::Sfixed32,
        "float" => FieldType::Float,
        "fixed64" => FieldType::Fixed64,
        "sfixed64" => FieldType::Sfixed64,
        "double" => FieldType::Double,
        "string" => FieldType::String,
        "bytes" => FieldType::Bytes,
        _ => return None,
    })
}

fn literal(i: &str) -> PResult<'_, Literal> {
    alt((
        map(str_lit, Literal::Str),
        map(float_lit, Literal::Float),
        map(int_lit, Literal::Int),
        map(ident, |id| match id.as_str() {
            "true" => Literal::Bool(true),
            "false" => Literal::Bool(false),
            _ => Literal::Ident(id),
        }),
        map(preceded(sym("-"), ident), |id| {
            Literal::Ident(format!("-{}", id))
        }),
    ))(i)
}

fn int_lit(i: &str) -> PResult<'_, i128> {
    let (i, _) = ws(i)?;
    let (i, neg) = opt(char('-'))(i)?;
    let (i, magnitude) = alt((
        map_res(preceded(tag_no_case("0x"), hex_digit1), |h: &str| {
            i128::from_str_radix(h, 16)
        }),
        map_res(preceded(char('0'), oct_digit1), |o: &str| {
            i128::from_str_radix(o, 8)
        }),
        map_res(digit1, |d: &str| d.parse::<i128>()),
    ))(i)?;
    Ok((i, if neg.is_some() { -magnitude } else { magnitude }))
}

fn float_lit(i: &str) -> PResult<'_, f64> {
    let (i, _) = ws(i)?;
    map_res(
        recognize(tuple((
            opt(char('-')),
            alt((
                recognize(tuple((digit1, char('.'), opt(digit1), opt(exponent)))),
                recognize(pair(digit1, exponent)),
            )),
        ))),
        |s: &str| s.parse::<f64>(),
    )(i)
}

fn exponent(i: &str) -> PResult<'_, &str> {
    recognize(tuple((one_of("eE"), opt(one_of("+-")), digit1)))(i)
}

fn str_lit(i: &str) -> PResult<'_, String> {
    let (input, _) = preceded(ws, char('"'))(i)?;
    let mut out = String::new();
    let mut chars = input.char_indices();
    while let Some((idx, c)) = chars.next() {
        match c {
            '"' => return Ok((&input[idx + 1..], out)),
            '\\' => match chars.next() {
                Some((_, 'n')) => out.push('\n'),
                Some((_, 't')) => out.push('\t'),
                Some((_, 'r')) => out.push('\r'),
                Some((_, '0')) => out.push('\0'),
                Some((_, other)) => out.push(other),
                None => break,
            },
            '\n' => break,
            _ => out.push(c),
        }
    }
    Err(failure(i))
}

fn qualified(i: &str) -> PResult<'_, String> {
    map(
        preceded(
            ws,
            recognize(tuple((
                opt(char('.')),
                ident_str,
                many0(pair(char('.'), ident_str)),
            ))),
        ),
        str::to_string,
    )(i)
}

fn ident(i: &str) -> PResult<'_, String> {
    map(preceded(ws, ident_str), str::to_string)(i)
}

fn ident_str(i: &str) -> PResult<'_, &str> {
    recognize(pair(
        take_while1(|c: char| c.is_ascii_alphabetic() || c == '_'),
        take_while(|c: char| c.is_ascii_alphanumeric() || c == '_'),
    ))(i)
}

/// Matches `kw` as a whole identifier, so `optional_x` is not `optional`.
fn keyword<'a>(kw: &'static str) -> impl FnMut(&'a str) -> PResult<'a, ()> {
    move |input: &'a str| {
        let (rest, _) = ws(input)?;
        let (rest, id) = ident_str(rest)?;
        if id == kw {
            Ok((rest, ()))
        } else {
            Err(error(input))
        }
    }
}

fn sym<'a>(t: &'static str) -> impl FnMut(&'a str) -> PResult<'a, ()> {
    move |input: &'a str| value((), preceded(ws, tag(t)))(input)
}

fn ws(i: &str) -> PResult<'_, ()> {
    value(
        (),
        many0(alt((value((), multispace1), line_comment, block_comment))),
    )(i)
}

fn line_comment(i: &str) -> PResult<'_, ()> {
    value((), pair(tag("//"), take_while(|c| c != '\n')))(i)
}

fn block_comment(i: &str) -> PResult<'_, ()> {
    value((), tuple((tag("/*"), take_until("*/"), tag("*/"))))(i)
}

fn error(i: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Error(nom::error::Error::new(i, nom::error::ErrorKind::Tag))
}

fn failure(i: &str) -> nom::Err<nom::error::Error<&str>> {
    nom::Err::Failure(nom::error::Error::new(i, nom::error::ErrorKind::Verify))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_representative_file() {
        let src = r#"
            syntax = "proto2";
            package store.items;

            import "common.proto";
            import public "colors.proto";

            option java_package = "com.example.store";

            // A shirt for sale.
            message Shirt {
                enum Size {
                    SMALL = 0;
                    MEDIUM = 1;
                    LARGE = 2;
                }
                required string color = 1;
                optional Size size = 2 [default = MEDIUM];
                repeated int32 measurements = 3 [packed = true];
                optional .store.items.Shirt variant = 4;
                reserved 9, 10;
                extensions 100 to 199;
            }

            extend Shirt {
                optional bytes label = 101;
            }
        "#;
        let file = parse_proto(src).unwrap();
        assert_eq!(file.package.as_deref(), Some("store.items"));
        assert_eq!(file.imports, ["common.proto", "colors.proto"]);
        assert_eq!(file.decls.len(), 2);

        let Decl::Message(shirt) = &file.decls[0] else {
            panic!("expected a message");
        };
        assert_eq!(shirt.name, "Shirt");
        assert_eq!(shirt.fields.len(), 4);
        assert_eq!(shirt.enums.len(), 1);
        assert_eq!(shirt.enums[0].values[1], ("MEDIUM".to_string(), 1));

        assert_eq!(shirt.fields[0].occurrence, Occurrence::Required);
        assert_eq!(shirt.fields[0].ty, TypeAst::Scalar(FieldType::String));
        assert_eq!(
            shirt.fields[1].opts,
            [OptAst::Default(Literal::Ident("MEDIUM".to_string()))]
        );
        assert_eq!(shirt.fields[2].opts, [OptAst::Packed(true)]);
        assert_eq!(
            shirt.fields[3].ty,
            TypeAst::Named(".store.items.Shirt".to_string())
        );

        let Decl::Extend(extend) = &file.decls[1] else {
            panic!("expected an extend block");
        };
        assert_eq!(extend.target, "Shirt");
        assert_eq!(extend.fields[0].fnum, 101);
    }

    #[test]
    fn parses_numeric_literals() {
        let src = "message N {
            optional int32 a = 1 [default = -4];
            optional uint32 b = 2 [default = 0x1F];
            optional double c = 3 [default = 1.5e3];
            optional double d = 4 [default = -inf];
            optional bool e = 5 [default = true];
            optional string f = 6 [default = \"a\\nb\"];
        }";
        let file = parse_proto(src).unwrap();
        let Decl::Message(msg) = &file.decls[0] else {
            panic!("expected a message");
        };
        let defaults: Vec<&OptAst> = msg.fields.iter().map(|f| &f.opts[0]).collect();
        assert_eq!(defaults[0], &OptAst::Default(Literal::Int(-4)));
        assert_eq!(defaults[1], &OptAst::Default(Literal::Int(31)));
        assert_eq!(defaults[2], &OptAst::Default(Literal::Float(1500.0)));
        assert_eq!(
            defaults[3],
            &OptAst::Default(Literal::Ident("-inf".to_string()))
        );
        assert_eq!(defaults[4], &OptAst::Default(Literal::Bool(true)));
        assert_eq!(
            defaults[5],
            &OptAst::Default(Literal::Str("a\nb".to_string()))
        );
    }

    #[test]
    fn rejects_proto3() {
        let err = parse_proto("syntax = \"proto3\";").unwrap_err();
        assert!(err.detail.contains("proto3"));
    }

    #[test]
    fn reports_error_lines() {
        let err = parse_proto("message M {\n  required int32 x = ;\n}").unwrap_err();
        assert_eq!(err.line, 2);
    }

    #[test]
    fn scan_check_catches_unterminated_tokens() {
        assert!(scan_check("message M {}").is_ok());
        let err = scan_check("/* no end\nmessage M {}").unwrap_err();
        assert!(err.contains("block comment"));
        let err = scan_check("import \"oops\nmessage M {}").unwrap_err();
        assert!(err.contains("string"));
    }
}

//! Light signature scan over module source.
//!
//! Ingest only needs procedure metadata (names, kinds, parameter lists);
//! bodies are parsed later, on demand, by the runtime crate. A line-based
//! regex scan is enough for that and survives source the full parser would
//! reject.

use std::sync::OnceLock;

use regex::Regex;

/// Declared type of a parameter or return value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeName {
    Boolean,
    Byte,
    Integer,
    Long,
    Single,
    Double,
    Currency,
    String,
    Date,
    Object,
    Variant,
    UserDefined(String),
}

impl TypeName {
    pub fn parse(name: &str) -> TypeName {
        match name.to_ascii_lowercase().as_str() {
            "boolean" => TypeName::Boolean,
            "byte" => TypeName::Byte,
            "integer" => TypeName::Integer,
            "long" => TypeName::Long,
            "single" => TypeName::Single,
            "double" => TypeName::Double,
            "currency" => TypeName::Currency,
            "string" => TypeName::String,
            "date" => TypeName::Date,
            "object" => TypeName::Object,
            "variant" => TypeName::Variant,
            _ => TypeName::UserDefined(name.to_string()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcedureKind {
    Sub,
    Function,
    PropertyGet,
    PropertyLet,
    PropertySet,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Private,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub type_name: Option<TypeName>,
    pub by_val: bool,
    pub optional: bool,
    /// Default value literal, verbatim source text.
    pub default: Option<String>,
    pub param_array: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Procedure {
    pub name: String,
    pub kind: ProcedureKind,
    pub visibility: Visibility,
    pub parameters: Vec<Parameter>,
    /// Only `Function` and `Property Get` declare one.
    pub return_type: Option<TypeName>,
}

fn header_regex() -> &'static Regex {
    static HEADER: OnceLock<Regex> = OnceLock::new();
    HEADER.get_or_init(|| {
        Regex::new(
            r"(?i)^\s*(?:(Public|Private|Friend)\s+)?(?:Static\s+)?(Sub|Function|Property\s+Get|Property\s+Let|Property\s+Set)\s+([A-Za-z][A-Za-z0-9_]*)",
        )
        .expect("procedure header pattern")
    })
}

/// Extract procedure signatures from module source.
pub fn scan_procedures(source: &str) -> Vec<Procedure> {
    // Fold line continuations so a wrapped signature scans as one line.
    let joined = source.replace("_\r\n", " ").replace("_\n", " ");
    let mut procedures = Vec::new();
    for line in joined.lines() {
        if let Some(procedure) = parse_signature(line) {
            procedures.push(procedure);
        }
    }
    procedures
}

fn parse_signature(line: &str) -> Option<Procedure> {
    let caps = header_regex().captures(line)?;
    let visibility = match caps.get(1).map(|m| m.as_str().to_ascii_lowercase()) {
        Some(v) if v == "private" => Visibility::Private,
        _ => Visibility::Public,
    };
    let kind_text = caps.get(2)?.as_str().to_ascii_lowercase();
    let kind = match kind_text.split_whitespace().collect::<Vec<_>>()[..] {
        ["sub"] => ProcedureKind::Sub,
        ["function"] => ProcedureKind::Function,
        ["property", "get"] => ProcedureKind::PropertyGet,
        ["property", "let"] => ProcedureKind::PropertyLet,
        ["property", "set"] => ProcedureKind::PropertySet,
        _ => return None,
    };
    let name = caps.get(3)?.as_str().to_string();

    let rest = &line[caps.get(0)?.end()..];
    let (parameters, after_params) = match rest.trim_start().strip_prefix('(') {
        Some(inner) => {
            let close = matching_paren(inner)?;
            (parse_parameters(&inner[..close]), &inner[close + 1..])
        }
        None => (Vec::new(), rest),
    };

    let return_type = if matches!(kind, ProcedureKind::Function | ProcedureKind::PropertyGet) {
        parse_as_clause(after_params)
    } else {
        None
    };

    Some(Procedure {
        name,
        kind,
        visibility,
        parameters,
        return_type,
    })
}

/// Index of the parenthesis closing the one already consumed, skipping
/// string literals.
fn matching_paren(text: &str) -> Option<usize> {
    let mut depth = 1usize;
    let mut in_string = false;
    for (i, ch) in text.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_as_clause(text: &str) -> Option<TypeName> {
    let trimmed = text.trim();
    let rest = trimmed
        .strip_prefix("As ")
        .or_else(|| trimmed.strip_prefix("as "))
        .or_else(|| trimmed.strip_prefix("AS "))?;
    let type_name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '.')
        .collect();
    if type_name.is_empty() {
        None
    } else {
        Some(TypeName::parse(&type_name))
    }
}

fn parse_parameters(text: &str) -> Vec<Parameter> {
    split_top_level(text)
        .into_iter()
        .filter_map(|part| parse_parameter(part.trim()))
        .collect()
}

/// Split on commas outside parentheses and string literals.
fn split_top_level(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut start = 0usize;
    for (i, ch) in text.char_indices() {
        match ch {
            '"' => in_string = !in_string,
            '(' if !in_string => depth += 1,
            ')' if !in_string => depth = depth.saturating_sub(1),
            ',' if !in_string && depth == 0 => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts.into_iter().filter(|p| !p.trim().is_empty()).collect()
}

fn parse_parameter(text: &str) -> Option<Parameter> {
    let mut rest = text;
    let mut optional = false;
    let mut by_val = false;
    let mut param_array = false;

    loop {
        let lowered = rest.trim_start();
        if let Some(r) = strip_keyword(lowered, "optional") {
            optional = true;
            rest = r;
        } else if let Some(r) = strip_keyword(lowered, "byval") {
            by_val = true;
            rest = r;
        } else if let Some(r) = strip_keyword(lowered, "byref") {
            rest = r;
        } else if let Some(r) = strip_keyword(lowered, "paramarray") {
            param_array = true;
            rest = r;
        } else {
            rest = lowered;
            break;
        }
    }

    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() {
        return None;
    }
    let mut tail = rest[name.len()..].trim_start();
    // Array marker on the parameter name.
    if let Some(stripped) = tail.strip_prefix("()") {
        tail = stripped.trim_start();
    }

    let mut default = None;
    let type_name = if let Some(eq) = tail.find('=') {
        let before = &tail[..eq];
        default = Some(tail[eq + 1..].trim().to_string());
        parse_as_clause(before)
    } else {
        parse_as_clause(tail)
    };

    Some(Parameter {
        name,
        type_name,
        by_val,
        optional,
        default,
        param_array,
    })
}

fn strip_keyword<'a>(text: &'a str, keyword: &str) -> Option<&'a str> {
    if text.len() >= keyword.len() && text[..keyword.len()].eq_ignore_ascii_case(keyword) {
        let rest = &text[keyword.len()..];
        if rest.starts_with(char::is_whitespace) {
            return Some(rest.trim_start());
        }
    }
    None
}

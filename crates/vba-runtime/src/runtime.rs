//! The runtime handle: a registry of named procedures plus the entry
//! point that executes one of them against a host.

use std::collections::HashMap;

use crate::ast::{Expr, Stmt};
use crate::error::VbaError;
use crate::eval::{call_procedure, execute_statements, Context};
use crate::host::HostApi;
use crate::parser::{parse_expression, parse_procedure_body, parse_source};
use crate::value::Value;

/// Tunable execution bounds, in the spirit of a sandbox policy: a macro
/// must not be able to hang or blow the stack of its embedder.
#[derive(Debug, Clone, Copy)]
pub struct EvalLimits {
    pub max_call_depth: usize,
    pub max_loop_iterations: u64,
}

impl Default for EvalLimits {
    fn default() -> Self {
        Self {
            max_call_depth: 256,
            max_loop_iterations: 1_000_000,
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

#[derive(Debug, Clone)]
pub struct ParamDef {
    pub name: String,
    pub optional: bool,
    pub default: Option<Expr>,
    pub by_val: bool,
}

/// A callable procedure: signature plus parsed body.
#[derive(Debug, Clone)]
pub struct ProcedureDef {
    pub name: String,
    pub kind: ProcedureKind,
    pub params: Vec<ParamDef>,
    pub body: Vec<Stmt>,
}

/// Registers named procedures and calls them against a host.
#[derive(Debug, Default)]
pub struct VbaRuntime {
    procedures: HashMap<String, ProcedureDef>,
    module_statements: Vec<Stmt>,
    limits: EvalLimits,
}

impl VbaRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(mut self, limits: EvalLimits) -> Self {
        self.limits = limits;
        self
    }

    pub fn register_procedure(&mut self, def: ProcedureDef) {
        self.procedures.insert(def.name.to_lowercase(), def);
    }

    /// Parse a whole module: its procedures are registered and its
    /// module-level statements run before each call.
    pub fn register_source(&mut self, source: &str) -> Result<(), VbaError> {
        self.module_statements.extend(parse_source(source)?);
        for def in extract_procedures(source)? {
            self.register_procedure(def);
        }
        Ok(())
    }

    pub fn has_procedure(&self, name: &str) -> bool {
        self.procedures.contains_key(&name.to_lowercase())
    }

    /// Execute a registered procedure by name. Each call runs in a fresh
    /// context; module-level statements seed the global scope first.
    pub fn call(
        &self,
        host: &mut dyn HostApi,
        name: &str,
        args: &[Value],
    ) -> Result<Value, VbaError> {
        let def = self
            .procedures
            .get(&name.to_lowercase())
            .cloned()
            .ok_or_else(|| VbaError::ProcedureNotDefined(name.to_string()))?;

        let mut ctx = Context::with_limits(host, self.limits);
        ctx.procedures = self.procedures.clone();
        execute_statements(&self.module_statements, &mut ctx)?;
        call_procedure(&mut ctx, &def, args)
    }
}

/// Extract procedure definitions (signature plus parsed body) from
/// module source text.
pub fn extract_procedures(source: &str) -> Result<Vec<ProcedureDef>, VbaError> {
    // Fold line continuations so each signature occupies one line.
    let joined = source.replace("_\r\n", " ").replace("_\n", " ");
    let mut procedures = Vec::new();
    let mut lines = joined.lines();
    while let Some(line) = lines.next() {
        let Some((kind, name, params)) = parse_header(line)? else {
            continue;
        };
        let mut body = String::new();
        let mut terminated = false;
        for body_line in lines.by_ref() {
            if is_end_line(body_line) {
                terminated = true;
                break;
            }
            body.push_str(body_line);
            body.push('\n');
        }
        if !terminated {
            return Err(VbaError::Syntax {
                message: format!("procedure '{name}' is missing its End line"),
                line: 0,
                column: 0,
            });
        }
        procedures.push(ProcedureDef {
            name,
            kind,
            params,
            body: parse_procedure_body(&body)?,
        });
    }
    Ok(procedures)
}

fn is_end_line(line: &str) -> bool {
    let mut words = line.trim().split_whitespace();
    if !matches!(words.next(), Some(w) if w.eq_ignore_ascii_case("end")) {
        return false;
    }
    matches!(
        words.next(),
        Some(w) if w.eq_ignore_ascii_case("sub")
            || w.eq_ignore_ascii_case("function")
            || w.eq_ignore_ascii_case("property")
    )
}

type Header = (ProcedureKind, String, Vec<ParamDef>);

fn parse_header(line: &str) -> Result<Option<Header>, VbaError> {
    let mut rest = line.trim();
    for prefix in ["public", "private", "friend"] {
        if let Some(stripped) = strip_word(rest, prefix) {
            rest = stripped;
            break;
        }
    }
    if let Some(stripped) = strip_word(rest, "static") {
        rest = stripped;
    }

    let kind = if let Some(stripped) = strip_word(rest, "sub") {
        rest = stripped;
        ProcedureKind::Sub
    } else if let Some(stripped) = strip_word(rest, "function") {
        rest = stripped;
        ProcedureKind::Function
    } else if let Some(stripped) = strip_word(rest, "property") {
        rest = stripped;
        if let Some(stripped) = strip_word(rest, "get") {
            rest = stripped;
            ProcedureKind::PropertyGet
        } else if let Some(stripped) = strip_word(rest, "let") {
            rest = stripped;
            ProcedureKind::PropertyLet
        } else if let Some(stripped) = strip_word(rest, "set") {
            rest = stripped;
            ProcedureKind::PropertySet
        } else {
            return Ok(None);
        }
    } else {
        return Ok(None);
    };

    let name: String = rest
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
        .collect();
    if name.is_empty() || !name.chars().next().is_some_and(|c| c.is_ascii_alphabetic()) {
        return Ok(None);
    }
    let after_name = rest[name.len()..].trim_start();

    let params = match after_name.strip_prefix('(') {
        Some(inner) => {
            let Some(close) = matching_paren(inner) else {
                return Err(VbaError::Syntax {
                    message: format!("unbalanced parameter list for '{name}'"),
                    line: 0,
                    column: 0,
                });
            };
            parse_params(&inner[..close])?
        }
        None => Vec::new(),
    };

    Ok(Some((kind, name, params)))
}

fn strip_word<'a>(text: &'a str, word: &str) -> Option<&'a str> {
    if text.len() > word.len()
        && text[..word.len()].eq_ignore_ascii_case(word)
        && text[word.len()..].starts_with(char::is_whitespace)
    {
        Some(text[word.len()..].trim_start())
    } else {
        None
    }
}

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

fn parse_params(text: &str) -> Result<Vec<ParamDef>, VbaError> {
    let mut params = Vec::new();
    for part in split_top_level(text) {
        let mut rest = part.trim();
        if rest.is_empty() {
            continue;
        }
        let mut optional = false;
        let mut by_val = false;
        loop {
            if let Some(stripped) = strip_word(rest, "optional") {
                optional = true;
                rest = stripped;
            } else if let Some(stripped) = strip_word(rest, "byval") {
                by_val = true;
                rest = stripped;
            } else if let Some(stripped) = strip_word(rest, "byref") {
                rest = stripped;
            } else if let Some(stripped) = strip_word(rest, "paramarray") {
                optional = true;
                rest = stripped;
            } else {
                break;
            }
        }
        let name: String = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .collect();
        if name.is_empty() {
            continue;
        }
        let tail = rest[name.len()..].trim_start();
        let tail = tail.strip_prefix("()").unwrap_or(tail).trim_start();
        let default = match tail.find('=') {
            Some(eq) => Some(parse_expression(tail[eq + 1..].trim())?),
            None => None,
        };
        params.push(ParamDef {
            name,
            optional,
            default,
            by_val,
        });
    }
    Ok(params)
}

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
    parts
}

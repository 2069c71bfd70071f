//! Tree-walking evaluator.
//!
//! A [`Context`] owns the scope arena, With stack, exit flags, and call
//! stack for one single-threaded execution; the host object model is
//! borrowed for the duration. Expressions and statements dispatch on
//! their tags and every fallible path reports a [`VbaError`].

use std::collections::HashMap;

use regex::Regex;

use crate::ast::{
    BinaryOp, CaseCondition, ConditionPosition, ErrorHandling, ExitKind, Expr, Literal,
    LoopConditionKind, Stmt, UnaryOp,
};
use crate::builtins;
use crate::error::VbaError;
use crate::host::HostApi;
use crate::runtime::{EvalLimits, ProcedureDef, ProcedureKind};
use crate::scope::{CallFrame, CallStack, ExitFlags, ScopeArena, ScopeKind};
use crate::value::{parse_date_text, Value};

/// Execution context for one run: scope chain, With stack, exit flags,
/// call stack, registered procedures, and the host binding.
pub struct Context<'h> {
    pub(crate) scopes: ScopeArena,
    pub(crate) with_stack: Vec<Value>,
    pub(crate) exit_flags: ExitFlags,
    pub(crate) call_stack: CallStack,
    pub(crate) host: &'h mut dyn HostApi,
    pub(crate) procedures: HashMap<String, ProcedureDef>,
    pub(crate) limits: EvalLimits,
    pub(crate) resume_next: bool,
}

impl<'h> Context<'h> {
    pub fn new(host: &'h mut dyn HostApi) -> Self {
        Self::with_limits(host, EvalLimits::default())
    }

    pub fn with_limits(host: &'h mut dyn HostApi, limits: EvalLimits) -> Self {
        Self {
            scopes: ScopeArena::new(),
            with_stack: Vec::new(),
            exit_flags: ExitFlags::default(),
            call_stack: CallStack::new(limits.max_call_depth),
            host,
            procedures: HashMap::new(),
            limits,
            resume_next: false,
        }
    }

    pub fn register_procedure(&mut self, def: ProcedureDef) {
        self.procedures.insert(def.name.to_lowercase(), def);
    }

    /// Read a variable from the current scope chain (`Empty` when
    /// undeclared).
    pub fn get_variable(&self, name: &str) -> Value {
        self.scopes.get(name)
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.scopes.set(name, value);
    }
}

/// Built-in names the identifier lookup resolves before consulting the
/// scope chain.
fn language_constant(name: &str) -> Option<Value> {
    let value = match name.to_ascii_lowercase().as_str() {
        "vbcr" => Value::from("\r"),
        "vblf" => Value::from("\n"),
        "vbcrlf" | "vbnewline" => Value::from("\r\n"),
        "vbtab" => Value::from("\t"),
        "vbnullchar" => Value::from("\0"),
        "vbnullstring" => Value::from(""),
        "vbok" => Value::Number(1.0),
        "vbcancel" => Value::Number(2.0),
        "vbabort" => Value::Number(3.0),
        "vbretry" => Value::Number(4.0),
        "vbignore" => Value::Number(5.0),
        "vbyes" => Value::Number(6.0),
        "vbno" => Value::Number(7.0),
        "vbtrue" => Value::Number(-1.0),
        "vbfalse" => Value::Number(0.0),
        _ => return None,
    };
    Some(value)
}

pub fn evaluate_expression(expr: &Expr, ctx: &mut Context<'_>) -> Result<Value, VbaError> {
    match expr {
        Expr::Literal(literal) => evaluate_literal(literal),
        Expr::Identifier(name) => {
            if let Some(value) = language_constant(name) {
                return Ok(value);
            }
            if ctx.scopes.is_declared(name) {
                return Ok(ctx.scopes.get(name));
            }
            if let Some(value) = ctx.host.get_global_object(name) {
                return Ok(value);
            }
            Ok(Value::Empty)
        }
        Expr::Member { object, member } => {
            let target = resolve_member_target(object.as_deref(), ctx)?;
            match target {
                Value::Object(obj) => ctx.host.get_property(&obj, member),
                _ => Err(VbaError::ObjectRequired),
            }
        }
        Expr::Index { target, indexes } => {
            let value = evaluate_expression(target, ctx)?;
            let indexes = evaluate_args(indexes, ctx)?;
            index_value(&value, &indexes, ctx)
        }
        Expr::Call { target, args } => evaluate_call(target, args, ctx),
        Expr::Binary { op, left, right } => {
            // Both operands always evaluate; logical operators never
            // short-circuit.
            let lhs = evaluate_expression(left, ctx)?;
            let rhs = evaluate_expression(right, ctx)?;
            match op {
                BinaryOp::Is => object_identity(&lhs, &rhs),
                BinaryOp::Like => Ok(Value::Boolean(like_match(
                    &lhs.to_vba_string(),
                    &rhs.to_vba_string(),
                ))),
                _ => crate::value::apply_binary(*op, &lhs, &rhs),
            }
        }
        Expr::Unary { op, operand } => {
            let value = evaluate_expression(operand, ctx)?;
            match op {
                UnaryOp::Neg => Ok(Value::Number(-value.to_number())),
                UnaryOp::Not => match value {
                    Value::Boolean(b) => Ok(Value::Boolean(!b)),
                    other => Ok(Value::Number(!(other.to_long()) as f64)),
                },
            }
        }
        Expr::New(class) => Err(VbaError::NotImplemented(format!("New {class}"))),
        Expr::TypeOf { value, type_name } => {
            let value = evaluate_expression(value, ctx)?;
            let matches = match value {
                Value::Object(obj) => obj.type_tag.eq_ignore_ascii_case(type_name),
                _ => false,
            };
            Ok(Value::Boolean(matches))
        }
        Expr::Paren(inner) => evaluate_expression(inner, ctx),
        Expr::Missing => Ok(Value::Empty),
    }
}

fn evaluate_literal(literal: &Literal) -> Result<Value, VbaError> {
    match literal {
        Literal::Number(n) => Ok(Value::Number(*n)),
        Literal::Str(s) => Ok(Value::String(s.clone())),
        Literal::Bool(b) => Ok(Value::Boolean(*b)),
        Literal::Date(text) => parse_date_text(text)
            .map(Value::Date)
            .ok_or(VbaError::TypeMismatch),
        Literal::Nothing => Ok(Value::Nothing),
        Literal::Null => Ok(Value::Empty),
        Literal::Empty => Ok(Value::Empty),
    }
}

fn resolve_member_target(
    object: Option<&Expr>,
    ctx: &mut Context<'_>,
) -> Result<Value, VbaError> {
    match object {
        Some(expr) => evaluate_expression(expr, ctx),
        None => ctx
            .with_stack
            .last()
            .cloned()
            .ok_or(VbaError::ObjectRequired),
    }
}

fn evaluate_args(args: &[Expr], ctx: &mut Context<'_>) -> Result<Vec<Value>, VbaError> {
    // Strict left-to-right evaluation.
    args.iter()
        .map(|arg| evaluate_expression(arg, ctx))
        .collect()
}

fn evaluate_call(target: &Expr, args: &[Expr], ctx: &mut Context<'_>) -> Result<Value, VbaError> {
    let argv = evaluate_args(args, ctx)?;
    match target {
        Expr::Identifier(name) => {
            if let Some(builtin) = builtins::lookup(name) {
                return builtin(&argv);
            }
            if let Some(def) = ctx.procedures.get(&name.to_lowercase()).cloned() {
                return call_procedure(ctx, &def, &argv);
            }
            // A declared name with postfix parentheses indexes its value.
            if ctx.scopes.is_declared(name) {
                let value = ctx.scopes.get(name);
                if argv.is_empty() {
                    return Ok(value);
                }
                return index_value(&value, &argv, ctx);
            }
            if let Some(value) = ctx.host.get_global_object(name) {
                if argv.is_empty() {
                    return Ok(value);
                }
                if let Value::Object(obj) = &value {
                    return ctx.host.get_indexed(obj, &argv);
                }
                return index_value(&value, &argv, ctx);
            }
            Err(VbaError::ProcedureNotDefined(name.clone()))
        }
        Expr::Member { object, member } => {
            let target = resolve_member_target(object.as_deref(), ctx)?;
            match target {
                Value::Object(obj) => ctx.host.call_method(&obj, member, &argv),
                _ => Err(VbaError::ObjectRequired),
            }
        }
        other => {
            let value = evaluate_expression(other, ctx)?;
            index_value(&value, &argv, ctx)
        }
    }
}

fn index_value(
    value: &Value,
    indexes: &[Value],
    ctx: &mut Context<'_>,
) -> Result<Value, VbaError> {
    match value {
        Value::Array(items) => {
            if indexes.len() != 1 {
                return Err(VbaError::NotImplemented(
                    "multi-dimensional arrays".to_string(),
                ));
            }
            let index = indexes[0].to_long();
            if index < 0 || index as usize >= items.len() {
                return Err(VbaError::SubscriptOutOfRange);
            }
            Ok(items[index as usize].clone())
        }
        Value::String(s) => {
            // 1-based character access; out of range reads as "".
            if indexes.len() != 1 {
                return Err(VbaError::SubscriptOutOfRange);
            }
            let index = indexes[0].to_long();
            if index < 1 {
                return Ok(Value::from(""));
            }
            Ok(s
                .chars()
                .nth(index as usize - 1)
                .map(|c| Value::String(c.to_string()))
                .unwrap_or_else(|| Value::from("")))
        }
        Value::Object(obj) => {
            let obj = obj.clone();
            ctx.host.get_indexed(&obj, indexes)
        }
        _ => Err(VbaError::TypeMismatch),
    }
}

fn object_identity(left: &Value, right: &Value) -> Result<Value, VbaError> {
    let identical = match (left, right) {
        (Value::Nothing, Value::Nothing) => true,
        (Value::Object(a), Value::Object(b)) => a.handle == b.handle,
        (Value::Nothing, Value::Object(_)) | (Value::Object(_), Value::Nothing) => false,
        _ => return Err(VbaError::ObjectRequired),
    };
    Ok(Value::Boolean(identical))
}

/// Compile a `Like` pattern (`?`, `*`, `#`, `[...]`, `[!...]`) to a
/// regex. Character-class ranges are not supported; `-` matches itself.
/// Unmatchable patterns compare as false rather than failing.
fn like_match(text: &str, pattern: &str) -> bool {
    let mut regex = String::from("^");
    let mut chars = pattern.chars().peekable();
    while let Some(ch) = chars.next() {
        match ch {
            '?' => regex.push('.'),
            '*' => regex.push_str(".*"),
            '#' => regex.push_str("\\d"),
            '[' => {
                let mut class = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == ']' {
                        closed = true;
                        break;
                    }
                    class.push(c);
                }
                if !closed {
                    return false;
                }
                regex.push('[');
                if let Some(rest) = class.strip_prefix('!') {
                    regex.push('^');
                    class = rest.to_string();
                }
                for c in class.chars() {
                    push_class_char(&mut regex, c);
                }
                regex.push(']');
            }
            other => regex.push_str(&regex::escape(&other.to_string())),
        }
    }
    regex.push('$');
    match Regex::new(&regex) {
        Ok(compiled) => compiled.is_match(text),
        Err(_) => false,
    }
}

/// Escape a character for use inside a regex character class. `-` is
/// escaped too: ranges are deliberately not part of the pattern syntax.
fn push_class_char(regex: &mut String, c: char) {
    if matches!(c, '^' | ']' | '\\' | '-') {
        regex.push('\\');
    }
    regex.push(c);
}

pub fn execute_statements(stmts: &[Stmt], ctx: &mut Context<'_>) -> Result<(), VbaError> {
    for stmt in stmts {
        if ctx.exit_flags.should_exit_procedure()
            || ctx.exit_flags.exit_for
            || ctx.exit_flags.exit_do
        {
            break;
        }
        match execute_statement(stmt, ctx) {
            Ok(()) => {}
            Err(err) if ctx.resume_next && suppressible(&err) => {}
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// `On Error Resume Next` swallows runtime errors but never parse
/// failures or stack exhaustion.
fn suppressible(err: &VbaError) -> bool {
    !matches!(err, VbaError::Syntax { .. } | VbaError::StackOverflow)
}

fn execute_statement(stmt: &Stmt, ctx: &mut Context<'_>) -> Result<(), VbaError> {
    match stmt {
        Stmt::Assign { target, value } | Stmt::SetAssign { target, value } => {
            // RHS first, then the store target.
            let value = evaluate_expression(value, ctx)?;
            store(target, value, ctx)
        }
        Stmt::Call(expr) => {
            match expr {
                // A bare name or member as a statement is a call.
                Expr::Identifier(_) | Expr::Member { .. } => {
                    evaluate_call(expr, &[], ctx)?;
                }
                Expr::Call { target, args } => {
                    evaluate_call(target, args, ctx)?;
                }
                other => {
                    evaluate_expression(other, ctx)?;
                }
            }
            Ok(())
        }
        Stmt::If {
            branches,
            else_body,
        } => {
            for (condition, body) in branches {
                if evaluate_expression(condition, ctx)?.to_boolean() {
                    return execute_statements(body, ctx);
                }
            }
            execute_statements(else_body, ctx)
        }
        Stmt::SelectCase {
            test,
            cases,
            else_body,
        } => {
            let test = evaluate_expression(test, ctx)?;
            for arm in cases {
                for condition in &arm.conditions {
                    // Range and Is conditions parse but compare as
                    // equality against their leading expression.
                    let candidate = match condition {
                        CaseCondition::Expr(expr) => expr,
                        CaseCondition::Range { from, .. } => from,
                        CaseCondition::Is { expr, .. } => expr,
                    };
                    let candidate = evaluate_expression(candidate, ctx)?;
                    if crate::value::compare(&test, &candidate) == std::cmp::Ordering::Equal {
                        return execute_statements(&arm.body, ctx);
                    }
                }
            }
            execute_statements(else_body, ctx)
        }
        Stmt::For {
            counter,
            start,
            end,
            step,
            body,
        } => {
            // Bounds and step are cached before the first iteration.
            let start = evaluate_expression(start, ctx)?.to_number();
            let end = evaluate_expression(end, ctx)?.to_number();
            let step = match step {
                Some(expr) => evaluate_expression(expr, ctx)?.to_number(),
                None => 1.0,
            };
            if step == 0.0 {
                return Err(VbaError::InvalidProcedureCall("For".to_string()));
            }
            ctx.scopes.set(counter, Value::Number(start));
            let mut iterations = 0u64;
            loop {
                let current = ctx.scopes.get(counter).to_number();
                if (step > 0.0 && current > end) || (step < 0.0 && current < end) {
                    break;
                }
                execute_statements(body, ctx)?;
                if ctx.exit_flags.exit_for {
                    ctx.exit_flags.exit_for = false;
                    break;
                }
                if ctx.exit_flags.should_exit_procedure() {
                    break;
                }
                iterations += 1;
                if iterations >= ctx.limits.max_loop_iterations {
                    return Err(VbaError::Overflow);
                }
                let next = ctx.scopes.get(counter).to_number() + step;
                ctx.scopes.set(counter, Value::Number(next));
            }
            Ok(())
        }
        Stmt::ForEach {
            element,
            collection,
            body,
        } => {
            let collection = evaluate_expression(collection, ctx)?;
            let items = match collection {
                Value::Array(items) => items,
                Value::Object(_) => {
                    return Err(VbaError::NotImplemented(
                        "For Each over host objects".to_string(),
                    ));
                }
                _ => return Err(VbaError::TypeMismatch),
            };
            for item in items {
                ctx.scopes.set(element, item);
                execute_statements(body, ctx)?;
                if ctx.exit_flags.exit_for {
                    ctx.exit_flags.exit_for = false;
                    break;
                }
                if ctx.exit_flags.should_exit_procedure() {
                    break;
                }
            }
            Ok(())
        }
        Stmt::DoLoop {
            condition,
            position,
            body,
        } => {
            let mut iterations = 0u64;
            loop {
                if *position == ConditionPosition::Pre {
                    if let Some((kind, expr)) = condition {
                        let holds = evaluate_expression(expr, ctx)?.to_boolean();
                        let keep_going = match kind {
                            LoopConditionKind::While => holds,
                            LoopConditionKind::Until => !holds,
                        };
                        if !keep_going {
                            break;
                        }
                    }
                }
                execute_statements(body, ctx)?;
                if ctx.exit_flags.exit_do {
                    ctx.exit_flags.exit_do = false;
                    break;
                }
                if ctx.exit_flags.should_exit_procedure() {
                    break;
                }
                if *position == ConditionPosition::Post {
                    if let Some((kind, expr)) = condition {
                        let holds = evaluate_expression(expr, ctx)?.to_boolean();
                        let keep_going = match kind {
                            LoopConditionKind::While => holds,
                            LoopConditionKind::Until => !holds,
                        };
                        if !keep_going {
                            break;
                        }
                    }
                }
                iterations += 1;
                if iterations >= ctx.limits.max_loop_iterations {
                    return Err(VbaError::Overflow);
                }
            }
            Ok(())
        }
        Stmt::While { condition, body } => {
            let mut iterations = 0u64;
            while evaluate_expression(condition, ctx)?.to_boolean() {
                execute_statements(body, ctx)?;
                if ctx.exit_flags.should_exit_procedure() {
                    break;
                }
                iterations += 1;
                if iterations >= ctx.limits.max_loop_iterations {
                    return Err(VbaError::Overflow);
                }
            }
            Ok(())
        }
        Stmt::Dim(vars) => {
            for var in vars {
                if var.dims.is_empty() {
                    ctx.scopes.declare(&var.name, Value::Empty);
                    continue;
                }
                if var.dims.len() > 1 {
                    return Err(VbaError::NotImplemented(
                        "multi-dimensional arrays".to_string(),
                    ));
                }
                let dim = &var.dims[0];
                let lower = match &dim.lower {
                    Some(expr) => evaluate_expression(expr, ctx)?.to_long(),
                    None => 0,
                };
                let upper = evaluate_expression(&dim.upper, ctx)?.to_long();
                let len = upper - lower + 1;
                if len < 0 {
                    return Err(VbaError::SubscriptOutOfRange);
                }
                ctx.scopes
                    .declare(&var.name, Value::Array(vec![Value::Empty; len as usize]));
            }
            Ok(())
        }
        Stmt::Exit(kind) => {
            match kind {
                ExitKind::Sub => ctx.exit_flags.exit_sub = true,
                ExitKind::Function => ctx.exit_flags.exit_function = true,
                ExitKind::Property => ctx.exit_flags.exit_property = true,
                ExitKind::For => ctx.exit_flags.exit_for = true,
                ExitKind::Do => ctx.exit_flags.exit_do = true,
            }
            Ok(())
        }
        Stmt::OnError(handling) => {
            // `GoTo <label>` degrades to `GoTo 0`: labels are not part of
            // the IR, so handlers cannot be jumped to.
            ctx.resume_next = matches!(handling, ErrorHandling::ResumeNext);
            Ok(())
        }
        Stmt::With { object, body } => {
            let object = evaluate_expression(object, ctx)?;
            ctx.with_stack.push(object);
            let result = execute_statements(body, ctx);
            ctx.with_stack.pop();
            result
        }
        Stmt::RaiseEvent { name, .. } => {
            Err(VbaError::NotImplemented(format!("RaiseEvent {name}")))
        }
    }
}

fn store(target: &Expr, value: Value, ctx: &mut Context<'_>) -> Result<(), VbaError> {
    match target {
        Expr::Identifier(name) => {
            ctx.scopes.set(name, value);
            Ok(())
        }
        Expr::Member { object, member } => {
            let target = resolve_member_target(object.as_deref(), ctx)?;
            match target {
                Value::Object(obj) => ctx.host.set_property(&obj, member, value),
                _ => Err(VbaError::ObjectRequired),
            }
        }
        Expr::Call {
            target: inner,
            args,
        } => {
            let indexes = evaluate_args(args, ctx)?;
            store_indexed(inner, &indexes, value, ctx)
        }
        Expr::Index { target, indexes } => {
            let indexes = evaluate_args(indexes, ctx)?;
            store_indexed(target, &indexes, value, ctx)
        }
        _ => Err(VbaError::Generic("invalid assignment target".to_string())),
    }
}

/// Store into `target(indexes)`: an array element held by a variable or
/// an indexed host object.
fn store_indexed(
    target: &Expr,
    indexes: &[Value],
    value: Value,
    ctx: &mut Context<'_>,
) -> Result<(), VbaError> {
    if let Expr::Identifier(name) = target {
        if ctx.scopes.is_declared(name) {
            match ctx.scopes.get(name) {
                Value::Array(mut items) => {
                    if indexes.len() != 1 {
                        return Err(VbaError::NotImplemented(
                            "multi-dimensional arrays".to_string(),
                        ));
                    }
                    let index = indexes[0].to_long();
                    if index < 0 || index as usize >= items.len() {
                        return Err(VbaError::SubscriptOutOfRange);
                    }
                    items[index as usize] = value;
                    ctx.scopes.set(name, Value::Array(items));
                    return Ok(());
                }
                Value::Object(obj) => {
                    return ctx.host.set_indexed(&obj, indexes, value);
                }
                _ => return Err(VbaError::TypeMismatch),
            }
        }
    }
    let resolved = evaluate_expression(target, ctx)?;
    match resolved {
        Value::Object(obj) => ctx.host.set_indexed(&obj, indexes, value),
        _ => Err(VbaError::TypeMismatch),
    }
}

/// Invoke a registered procedure with evaluated arguments.
pub(crate) fn call_procedure(
    ctx: &mut Context<'_>,
    def: &ProcedureDef,
    args: &[Value],
) -> Result<Value, VbaError> {
    if args.len() > def.params.len() {
        return Err(VbaError::InvalidProcedureCall(def.name.clone()));
    }
    ctx.call_stack.push(CallFrame {
        module: None,
        procedure: def.name.clone(),
        line: None,
    })?;
    let saved_scope = ctx.scopes.enter(ctx.scopes.global_index(), ScopeKind::Procedure);
    let saved_resume = ctx.resume_next;
    ctx.resume_next = false;

    let result = bind_and_run(ctx, def, args);

    // Exit flags are cleared at the procedure boundary so they never
    // leak into the caller.
    ctx.exit_flags.clear_procedure();
    ctx.exit_flags.exit_for = false;
    ctx.exit_flags.exit_do = false;
    ctx.resume_next = saved_resume;
    ctx.scopes.exit(saved_scope);
    ctx.call_stack.pop();
    result
}

fn bind_and_run(
    ctx: &mut Context<'_>,
    def: &ProcedureDef,
    args: &[Value],
) -> Result<Value, VbaError> {
    for (i, param) in def.params.iter().enumerate() {
        let value = match args.get(i) {
            Some(value) if !matches!(value, Value::Empty) || !param.optional => value.clone(),
            _ => match &param.default {
                Some(default) => evaluate_expression(default, ctx)?,
                None => Value::Empty,
            },
        };
        ctx.scopes.declare(&param.name, value);
    }

    let returns_value = matches!(
        def.kind,
        ProcedureKind::Function | ProcedureKind::PropertyGet
    );
    if returns_value {
        // The function's own name doubles as its return slot.
        ctx.scopes.declare(&def.name, Value::Empty);
    }

    execute_statements(&def.body, ctx)?;

    if returns_value {
        Ok(ctx.scopes.get(&def.name))
    } else {
        Ok(Value::Empty)
    }
}

//! Scope chains, the With stack, exit flags, and the call stack.
//!
//! Scopes live in an arena and refer to their parents by index, so a
//! child can never outlive an ancestor and no reference cycles are
//! possible. Names are lowercased once at insertion; lookups lowercase
//! before hashing and never fold case per-character.

use std::collections::HashMap;

use crate::error::VbaError;
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Global,
    Module,
    Procedure,
    Local,
    With,
}

#[derive(Debug)]
struct Scope {
    vars: HashMap<String, Value>,
    parent: Option<usize>,
    #[allow(dead_code)]
    kind: ScopeKind,
}

/// Arena of scopes with one designated current scope.
#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
    current: usize,
}

impl Default for ScopeArena {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeArena {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                vars: HashMap::new(),
                parent: None,
                kind: ScopeKind::Global,
            }],
            current: 0,
        }
    }

    pub fn global_index(&self) -> usize {
        0
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    /// Create a scope chained to `parent` and make it current. Returns
    /// the index of the previously current scope so the caller can
    /// restore it on exit.
    pub fn enter(&mut self, parent: usize, kind: ScopeKind) -> usize {
        let saved = self.current;
        self.scopes.push(Scope {
            vars: HashMap::new(),
            parent: Some(parent),
            kind,
        });
        self.current = self.scopes.len() - 1;
        saved
    }

    /// Leave the current scope, restoring `saved` as current. The
    /// departed scope's storage is reclaimed when it sits at the arena's
    /// end.
    pub fn exit(&mut self, saved: usize) {
        let leaving = self.current;
        self.current = saved;
        if leaving == self.scopes.len() - 1 && leaving != 0 {
            self.scopes.pop();
        }
    }

    /// Read a name through the chain. Undeclared names read as `Empty`.
    pub fn get(&self, name: &str) -> Value {
        let key = name.to_lowercase();
        let mut index = Some(self.current);
        while let Some(i) = index {
            if let Some(value) = self.scopes[i].vars.get(&key) {
                return value.clone();
            }
            index = self.scopes[i].parent;
        }
        Value::Empty
    }

    /// Assignment semantics: update the current frame if it declares the
    /// name, else update the nearest declaring ancestor, else implicitly
    /// declare in the current frame.
    pub fn set(&mut self, name: &str, value: Value) {
        let key = name.to_lowercase();
        let mut index = Some(self.current);
        while let Some(i) = index {
            if self.scopes[i].vars.contains_key(&key) {
                self.scopes[i].vars.insert(key, value);
                return;
            }
            index = self.scopes[i].parent;
        }
        self.scopes[self.current].vars.insert(key, value);
    }

    /// Declare in the current frame regardless of ancestors (`Dim`).
    pub fn declare(&mut self, name: &str, value: Value) {
        self.scopes[self.current]
            .vars
            .insert(name.to_lowercase(), value);
    }

    /// Whether any scope in the chain declares the name.
    pub fn is_declared(&self, name: &str) -> bool {
        let key = name.to_lowercase();
        let mut index = Some(self.current);
        while let Some(i) = index {
            if self.scopes[i].vars.contains_key(&key) {
                return true;
            }
            index = self.scopes[i].parent;
        }
        false
    }
}

/// Structured-exit flags consulted at block boundaries.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExitFlags {
    pub exit_sub: bool,
    pub exit_function: bool,
    pub exit_property: bool,
    pub exit_for: bool,
    pub exit_do: bool,
}

impl ExitFlags {
    pub fn should_exit_procedure(&self) -> bool {
        self.exit_sub || self.exit_function || self.exit_property
    }

    pub fn should_exit_for(&self) -> bool {
        self.exit_for || self.should_exit_procedure()
    }

    pub fn should_exit_do(&self) -> bool {
        self.exit_do || self.should_exit_procedure()
    }

    /// Cleared at the procedure boundary so flags never leak upward.
    pub fn clear_procedure(&mut self) {
        self.exit_sub = false;
        self.exit_function = false;
        self.exit_property = false;
    }
}

#[derive(Debug, Clone)]
pub struct CallFrame {
    pub module: Option<String>,
    pub procedure: String,
    pub line: Option<u32>,
}

/// Bounded stack of call frames.
#[derive(Debug)]
pub struct CallStack {
    frames: Vec<CallFrame>,
    limit: usize,
}

impl CallStack {
    pub fn new(limit: usize) -> Self {
        Self {
            frames: Vec::new(),
            limit,
        }
    }

    pub fn push(&mut self, frame: CallFrame) -> Result<(), VbaError> {
        if self.frames.len() >= self.limit {
            return Err(VbaError::StackOverflow);
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn pop(&mut self) {
        self.frames.pop();
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

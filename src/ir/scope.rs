//! Compile-time lexical scopes.
//!
//! Scopes live in one arena (`ScopeTree`) owned by the pipeline run that
//! built them; instructions and child scopes refer to them by `ScopeId`, so
//! the `outer` link never owns its target.

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::ir::structural_error::StructuralError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ScopeId(u32);

impl ScopeId {
    pub const ROOT: ScopeId = ScopeId(0);

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for ScopeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Where a variable lives inside its declaring scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VarSlot {
    pub index: usize,
}

/// What kind of construct introduced a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    /// Method body or program root: opaque to outward lookup.
    Method,
    /// Closure body: transparent to outward lookup, owns its own locals.
    Block,
    /// Conditional or loop body: its declarations belong to the nearest
    /// non-hoisting ancestor.
    Hoisted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LexicalScope {
    pub vars: FxHashMap<String, VarSlot>,
    pub hoist: bool,
    pub block: bool,
    pub outer: Option<ScopeId>,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolved {
    /// Scope that declares the variable.
    pub scope: ScopeId,
    /// Number of block boundaries crossed to reach it.
    pub depth: usize,
    pub slot: VarSlot,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown variable '{name}' (lookup from scope {scope})")]
pub struct UnknownVariable {
    pub name: String,
    pub scope: ScopeId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScopeTree {
    scopes: Vec<LexicalScope>,
}

impl Default for ScopeTree {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeTree {
    /// A tree holding only the program root scope.
    pub fn new() -> Self {
        Self {
            scopes: vec![LexicalScope {
                vars: FxHashMap::default(),
                hoist: false,
                block: false,
                outer: None,
            }],
        }
    }

    pub fn len(&self) -> usize {
        self.scopes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scopes.is_empty()
    }

    pub fn get(&self, id: ScopeId) -> &LexicalScope {
        &self.scopes[id.index()]
    }

    pub fn contains(&self, id: ScopeId) -> bool {
        id.index() < self.scopes.len()
    }

    /// Checks a tree that was decoded rather than built with `push`: the
    /// root exists, every `outer` names an earlier scope (so chains end at
    /// the root), and every slot indexes its scope's variables.
    pub fn validate(&self) -> Result<(), StructuralError> {
        if self.scopes.is_empty() {
            return Err(StructuralError::new(0, "scope tree has no root scope"));
        }

        for (index, scope) in self.scopes.iter().enumerate() {
            if let Some(outer) = scope.outer {
                if outer.index() >= index {
                    return Err(StructuralError::new(
                        0,
                        format!(
                            "scope s{} has outer {} that is not an earlier scope",
                            index, outer
                        ),
                    ));
                }
            }
            if let Some((name, slot)) = scope
                .vars
                .iter()
                .find(|(_, slot)| slot.index >= scope.vars.len())
            {
                return Err(StructuralError::new(
                    0,
                    format!(
                        "variable '{}' of scope s{} has slot {} out of range",
                        name, index, slot.index
                    ),
                ));
            }
        }
        Ok(())
    }

    pub fn ids(&self) -> impl Iterator<Item = ScopeId> {
        (0..self.scopes.len() as u32).map(ScopeId)
    }

    /// Opens a child scope of `outer`.
    pub fn push(&mut self, outer: ScopeId, kind: ScopeKind) -> ScopeId {
        let (hoist, block) = match kind {
            ScopeKind::Method => (false, false),
            ScopeKind::Block => (false, true),
            ScopeKind::Hoisted => (true, true),
        };
        let id = ScopeId(self.scopes.len() as u32);
        self.scopes.push(LexicalScope {
            vars: FxHashMap::default(),
            hoist,
            block,
            outer: Some(outer),
        });
        id
    }

    /// Nearest ancestor-or-self that does not hoist.
    pub fn hoist_target(&self, mut scope: ScopeId) -> ScopeId {
        while self.get(scope).hoist {
            match self.get(scope).outer {
                Some(outer) => scope = outer,
                None => break,
            }
        }
        scope
    }

    /// Registers `name` in the scope that owns declarations made in
    /// `scope`. Declaring an existing name returns its existing slot.
    pub fn declare(&mut self, scope: ScopeId, name: &str) -> (ScopeId, VarSlot) {
        let target = self.hoist_target(scope);
        let vars = &mut self.scopes[target.index()].vars;
        let next = VarSlot { index: vars.len() };
        let slot = *vars.entry(name.to_string()).or_insert(next);
        (target, slot)
    }

    /// Finds the declaration a read or write of `name` in `scope` binds to.
    ///
    /// Hoisting scopes are skipped without counting; each block boundary
    /// crossed adds one to `depth`. Non-block scopes stop the search, and so
    /// does `local_only`.
    pub fn resolve(
        &self,
        scope: ScopeId,
        name: &str,
        local_only: bool,
    ) -> Result<Resolved, UnknownVariable> {
        let unknown = || UnknownVariable {
            name: name.to_string(),
            scope,
        };

        let mut current = scope;
        let mut depth = 0;
        loop {
            while self.get(current).hoist {
                current = self.get(current).outer.ok_or_else(unknown)?;
            }

            let lexical = self.get(current);
            if let Some(slot) = lexical.vars.get(name) {
                return Ok(Resolved {
                    scope: current,
                    depth,
                    slot: *slot,
                });
            }

            match lexical.outer {
                Some(outer) if lexical.block && !local_only => {
                    current = outer;
                    depth += 1;
                }
                _ => return Err(unknown()),
            }
        }
    }

    /// Variable names of `scope` ordered by slot index.
    pub fn slot_names(&self, scope: ScopeId) -> Vec<&str> {
        let mut names: Vec<(&str, usize)> = self
            .get(scope)
            .vars
            .iter()
            .map(|(name, slot)| (name.as_str(), slot.index))
            .collect();
        names.sort_by_key(|(_, index)| *index);
        names.into_iter().map(|(name, _)| name).collect()
    }
}

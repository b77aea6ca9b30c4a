//! Symbolic operand stack used while translating one C function.
//!
//! Instead of an operand stack at run time, the generator keeps a stack of
//! C expressions. Pure pushes stay `Literal`s; anything with a side effect
//! or a value that could change later (calls, variable reads) is evaluated
//! once into a `Temp`, so program order is preserved.

use crate::ir::structural_error::{Stage, StructuralError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operand {
    /// Side-effect-free C expression, safe to repeat.
    Literal(String),
    /// Name of a C local holding an already evaluated value.
    Temp(String),
}

impl Operand {
    pub fn code(&self) -> &str {
        match self {
            Operand::Literal(code) | Operand::Temp(code) => code,
        }
    }
}

impl std::fmt::Display for Operand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Source of unique temp names, shared by every function of a unit.
#[derive(Debug, Default)]
pub struct Temps {
    next: usize,
}

impl Temps {
    pub fn fresh(&mut self) -> String {
        let name = format!("t{}", self.next);
        self.next += 1;
        name
    }
}

/// The most recent `Value tN = expr;` line.
#[derive(Debug, Clone)]
struct PendingDecl {
    temp: String,
    line: usize,
    expr: String,
}

/// Code and operand stack of a straight-line region: a function body or one
/// arm of a conditional.
#[derive(Debug, Default)]
pub struct GenScope {
    pub stack: Vec<Operand>,
    lines: Vec<String>,
    pending: Option<PendingDecl>,
}

/// A translated region, ready to be spliced into its parent.
#[derive(Debug, Clone)]
pub struct Branch {
    pub code: Vec<String>,
    pub stack: Vec<Operand>,
}

impl GenScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A region starting from this one's stack with an empty code buffer.
    pub fn fork(&self) -> Self {
        Self {
            stack: self.stack.clone(),
            lines: Vec::new(),
            pending: None,
        }
    }

    pub fn into_branch(self) -> Branch {
        Branch {
            code: self.lines,
            stack: self.stack,
        }
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn emit(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }

    /// Appends `code` one indentation level deeper.
    pub fn emit_nested(&mut self, code: Vec<String>) {
        self.lines
            .extend(code.into_iter().map(|line| format!("    {}", line)));
    }

    pub fn push(&mut self, operand: Operand) {
        self.stack.push(operand);
    }

    pub fn push_literal(&mut self, code: impl Into<String>) {
        self.stack.push(Operand::Literal(code.into()));
    }

    /// Evaluates `expr` now into a fresh temp and pushes the temp.
    pub fn memoize(&mut self, temps: &mut Temps, expr: String) {
        let temp = temps.fresh();
        self.lines.push(format!("Value {} = {};", temp, expr));
        self.pending = Some(PendingDecl {
            temp: temp.clone(),
            line: self.lines.len() - 1,
            expr,
        });
        self.stack.push(Operand::Temp(temp));
    }

    pub fn pop(&mut self, index: usize) -> Result<Operand, StructuralError> {
        self.stack
            .pop()
            .ok_or_else(|| StructuralError::out_of_stack(index).in_stage(Stage::Codegen))
    }

    pub fn peek(&self, index: usize) -> Result<&Operand, StructuralError> {
        self.stack
            .last()
            .ok_or_else(|| StructuralError::out_of_stack(index).in_stage(Stage::Codegen))
    }

    /// Pops `n` operands, returned in push order.
    pub fn pop_n(&mut self, n: usize, index: usize) -> Result<Vec<Operand>, StructuralError> {
        if self.stack.len() < n {
            return Err(StructuralError::out_of_stack(index).in_stage(Stage::Codegen));
        }
        Ok(self.stack.split_off(self.stack.len() - n))
    }

    /// Pops and discards. A temp declared by the line just emitted and not
    /// referenced anywhere else turns that declaration into a plain
    /// expression statement.
    pub fn pop_discard(&mut self, index: usize) -> Result<(), StructuralError> {
        let operand = self.pop(index)?;
        let Operand::Temp(name) = &operand else {
            return Ok(());
        };
        if self.stack.contains(&operand) {
            return Ok(());
        }
        if let Some(pending) = &self.pending {
            if &pending.temp == name && pending.line + 1 == self.lines.len() {
                self.lines[pending.line] = format!("{};", pending.expr);
                self.pending = None;
            }
        }
        Ok(())
    }
}

/// Reconciles the stacks that the arms of a conditional leave behind.
///
/// Entries every arm left untouched (the common prefix with `original`)
/// are kept as they are. Above that prefix each position gets a merge temp
/// that every arm assigns at its end. Returns the merge temps, which the
/// caller declares before the conditional, and the stack after it.
pub fn normalize_stack(
    temps: &mut Temps,
    original: &[Operand],
    branches: &mut [Branch],
) -> (Vec<String>, Vec<Operand>) {
    let prefix = branches
        .iter()
        .map(|branch| {
            branch
                .stack
                .iter()
                .zip(original)
                .take_while(|(a, b)| a == b)
                .count()
        })
        .min()
        .unwrap_or(0);

    let live = branches
        .iter()
        .map(|branch| branch.stack.len() - prefix)
        .min()
        .unwrap_or(0);

    let merged: Vec<String> = (0..live).map(|_| temps.fresh()).collect();

    for branch in branches.iter_mut() {
        let top = branch.stack.len() - live;
        for (temp, value) in merged.iter().zip(&branch.stack[top..]) {
            branch.code.push(format!("{} = {};", temp, value));
        }
    }

    let mut stack = original[..prefix].to_vec();
    stack.extend(merged.iter().cloned().map(Operand::Temp));
    (merged, stack)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn lit(code: &str) -> Operand {
        Operand::Literal(code.to_string())
    }

    fn branch(stack: Vec<Operand>) -> Branch {
        Branch {
            code: Vec::new(),
            stack,
        }
    }

    #[test]
    fn test_memoize_then_pop_becomes_statement() {
        let mut temps = Temps::default();
        let mut scope = GenScope::new();
        scope.memoize(&mut temps, "rt_call()".to_string());
        scope.pop_discard(0).unwrap();
        assert_eq!(scope.lines(), &["rt_call();".to_string()]);
        assert!(scope.stack.is_empty());
    }

    #[test]
    fn test_pop_keeps_declaration_still_referenced() {
        let mut temps = Temps::default();
        let mut scope = GenScope::new();
        scope.memoize(&mut temps, "rt_call()".to_string());
        let top = scope.peek(0).unwrap().clone();
        scope.push(top);
        scope.pop_discard(0).unwrap();
        assert_eq!(scope.lines(), &["Value t0 = rt_call();".to_string()]);
    }

    #[test]
    fn test_pop_keeps_declaration_followed_by_other_code() {
        let mut temps = Temps::default();
        let mut scope = GenScope::new();
        scope.memoize(&mut temps, "rt_call()".to_string());
        scope.emit("rt_other();");
        scope.pop_discard(0).unwrap();
        assert_eq!(scope.lines()[0], "Value t0 = rt_call();");
    }

    #[test]
    fn test_pop_empty_is_structural() {
        let mut scope = GenScope::new();
        let err = scope.pop(7).unwrap_err();
        assert_eq!(err.index, 7);
        assert_eq!(err.stage, Some(Stage::Codegen));
    }

    #[test]
    fn test_fork_starts_with_parent_stack() {
        let mut scope = GenScope::new();
        scope.push_literal("rt_int(1)");
        scope.emit("x;");
        let fork = scope.fork();
        assert_eq!(fork.stack, vec![lit("rt_int(1)")]);
        assert!(fork.lines().is_empty());
    }

    #[test]
    fn test_untouched_prefix_is_kept() {
        let mut temps = Temps::default();
        let original = vec![lit("a")];
        let mut branches = [
            branch(vec![lit("a"), lit("b")]),
            branch(vec![lit("a"), lit("c")]),
        ];
        let (merged, stack) = normalize_stack(&mut temps, &original, &mut branches);
        assert_eq!(merged, vec!["t0".to_string()]);
        assert_eq!(stack, vec![lit("a"), Operand::Temp("t0".to_string())]);
        assert_eq!(branches[0].code, vec!["t0 = b;".to_string()]);
        assert_eq!(branches[1].code, vec!["t0 = c;".to_string()]);
    }

    #[test]
    fn test_replaced_entry_is_merged() {
        // `a Dup If Pop b Else End`: the then-arm replaces `a`
        let mut temps = Temps::default();
        let original = vec![lit("a")];
        let mut branches = [branch(vec![lit("b")]), branch(vec![lit("a")])];
        let (merged, stack) = normalize_stack(&mut temps, &original, &mut branches);
        assert_eq!(merged.len(), 1);
        assert_eq!(stack, vec![Operand::Temp("t0".to_string())]);
        assert_eq!(branches[0].code, vec!["t0 = b;".to_string()]);
        assert_eq!(branches[1].code, vec!["t0 = a;".to_string()]);
    }

    #[test]
    fn test_uneven_branches_merge_to_shorter() {
        let mut temps = Temps::default();
        let mut branches = [branch(vec![lit("x"), lit("y")]), branch(vec![lit("z")])];
        let (merged, stack) = normalize_stack(&mut temps, &[], &mut branches);
        assert_eq!(merged.len(), 1);
        assert_eq!(stack.len(), 1);
        assert_eq!(branches[0].code, vec!["t0 = y;".to_string()]);
        assert_eq!(branches[1].code, vec!["t0 = z;".to_string()]);
    }
}

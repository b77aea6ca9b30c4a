use std::fmt::Write;

use rustc_hash::FxHashMap;

use crate::ir::op::{Instruction, Op};
use crate::ir::scope::ScopeTree;

/// Render a human-readable listing of an instruction list.
///
/// Block bodies are indented; `ELSE`/`WHILE_BODY` sit at the level of the
/// block that owns them.
pub fn listing(title: &str, instructions: &[Instruction], scopes: &ScopeTree) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "════════════════════════════════════════");
    let _ = writeln!(out, " {}", title);
    let _ = writeln!(
        out,
        " {} instructions, {} scopes",
        instructions.len(),
        scopes.len()
    );
    let _ = writeln!(out, "════════════════════════════════════════");

    let mut indent = 0usize;
    for (ip, instruction) in instructions.iter().enumerate() {
        let op = &instruction.op;
        let level = match op {
            Op::End(_) => {
                indent = indent.saturating_sub(1);
                indent
            }
            Op::Else | Op::WhileBody => indent.saturating_sub(1),
            _ => indent,
        };

        let _ = writeln!(
            out,
            "{:04}  {:<4} {}{}",
            ip,
            instruction.scope.to_string(),
            "  ".repeat(level),
            op
        );

        if op.opens_block().is_some() {
            indent += 1;
        }
    }

    out.push('\n');
    out.push_str(&scope_summary(scopes));
    out
}

/// One line per scope: flags, outer link and declared variables.
fn scope_summary(scopes: &ScopeTree) -> String {
    let mut out = String::new();
    for id in scopes.ids() {
        let scope = scopes.get(id);
        let mut flags = Vec::new();
        if scope.hoist {
            flags.push("hoist");
        }
        if scope.block {
            flags.push("block");
        }
        let outer = scope
            .outer
            .map(|o| o.to_string())
            .unwrap_or_else(|| "-".to_string());
        let _ = writeln!(
            out,
            "{:<4} outer={:<4} [{}] vars: {}",
            id.to_string(),
            outer,
            flags.join(","),
            scopes.slot_names(id).join(", ")
        );
    }
    out
}

/// Histogram of op kinds, keyed by the listing mnemonic.
pub fn count_ops(instructions: &[Instruction]) -> FxHashMap<String, usize> {
    let mut counts = FxHashMap::default();
    for instruction in instructions {
        let rendered = instruction.op.to_string();
        let mnemonic = rendered.split_whitespace().next().unwrap_or_default();
        *counts.entry(mnemonic.to_string()).or_insert(0) += 1;
    }
    counts
}

use std::collections::{BTreeMap, BTreeSet};

use crate::bytecode::Op;
use crate::bytecode::ir::Program;

/// Print disassembly of a compiled program
pub fn print_program(program: &Program) {
    print!("{}", disassemble(program));
}

/// Return disassembly as a String
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();
    let text = &program.text;
    let jump_targets = collect_jump_targets(text);
    let functions = collect_functions(program);

    out.push_str("=== BYTECODE PROGRAM ===\n");
    out.push_str(&format!(
        "text: {} words, data: {} bytes, entry: {:04}\n\n",
        text.len(),
        program.data.len(),
        program.entry
    ));

    let mut pc = 0;
    while pc < text.len() {
        if let Some(name) = functions.get(&pc) {
            out.push_str("════════════════════════════════════════\n");
            out.push_str(&format!(" {} @{:04}\n", name, pc));
            out.push_str("════════════════════════════════════════\n");
        }

        if jump_targets.contains(&pc) {
            out.push_str("      ┌──────────────────────────────────\n");
            out.push_str(&format!("{:04} ► ", pc));
        } else {
            out.push_str(&format!("{:04}   ", pc));
        }

        let Some(op) = Op::from_word(text[pc]) else {
            out.push_str(&format!(".word       {}\n", text[pc]));
            pc += 1;
            continue;
        };

        if !op.has_operand() {
            out.push_str(&format!("{}\n", op));
            pc += 1;
            continue;
        }

        let Some(&operand) = text.get(pc + 1) else {
            out.push_str(&format!("{:<11} <missing operand>\n", op));
            break;
        };
        out.push_str(&format_with_operand(op, operand, pc, &functions));
        out.push('\n');
        pc += 2;
    }

    out
}

fn format_with_operand(
    op: Op,
    operand: i64,
    pc: usize,
    functions: &BTreeMap<usize, String>,
) -> String {
    match op {
        Op::Jmp | Op::Jz | Op::Jnz => {
            let direction = if operand <= pc as i64 { "↑" } else { "↓" };
            format!("{:<11} {:04} {}", op, operand, direction)
        }
        Op::Call => match usize::try_from(operand).ok().and_then(|a| functions.get(&a)) {
            Some(name) => format!("{:<11} {:04} ; {}", op, operand, name),
            None => format!("{:<11} {:04}", op, operand),
        },
        Op::Lea => format!("{:<11} {:+}", op, operand),
        _ => format!("{:<11} {}", op, operand),
    }
}

/// Walks the text instruction by instruction and applies `f` to every
/// opcode/operand pair.
fn for_each_instruction(text: &[i64], mut f: impl FnMut(usize, Op, Option<i64>)) {
    let mut pc = 0;
    while pc < text.len() {
        match Op::from_word(text[pc]) {
            Some(op) if op.has_operand() => {
                f(pc, op, text.get(pc + 1).copied());
                pc += 2;
            }
            Some(op) => {
                f(pc, op, None);
                pc += 1;
            }
            None => pc += 1,
        }
    }
}

fn collect_jump_targets(text: &[i64]) -> BTreeSet<usize> {
    let mut targets = BTreeSet::new();

    for_each_instruction(text, |_, op, operand| {
        if op.is_branch() {
            if let Some(target) = operand.and_then(|t| usize::try_from(t).ok()) {
                targets.insert(target);
            }
        }
    });

    targets
}

/// Function entry points: every `ENT`, plus the start-up trampoline.
fn collect_functions(program: &Program) -> BTreeMap<usize, String> {
    let mut functions = BTreeMap::new();

    for_each_instruction(&program.text, |pc, op, _| {
        if op == Op::Ent {
            functions.insert(pc, format!("fn_{:04}", pc));
        }
    });
    functions.insert(program.main, "main".to_string());
    functions.insert(program.entry, "start".to_string());

    functions
}

// =============================================================================
// Statistics
// =============================================================================

/// Print opcode frequencies
pub fn print_stats(program: &Program) {
    println!("=== BYTECODE STATISTICS ===\n");

    let counts = op_counts(&program.text);
    let total: usize = counts.values().sum();

    println!("Text words:       {}", program.text.len());
    println!("Data bytes:       {}", program.data.len());
    println!("Instructions:     {}", total);
    println!();

    println!("Op frequency:");
    let mut counts: Vec<_> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(b.0)));

    for (op, count) in counts.iter().take(10) {
        let pct = (*count as f64 / total as f64) * 100.0;
        println!("  {:<14} {:>4} ({:>5.1}%)", op, count, pct);
    }
}

fn op_counts(text: &[i64]) -> BTreeMap<&'static str, usize> {
    let mut counts = BTreeMap::new();
    for_each_instruction(text, |_, op, _| {
        *counts.entry(op.mnemonic()).or_insert(0) += 1;
    });
    counts
}

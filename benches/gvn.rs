//! Benchmarks for SSA construction and global value numbering.
//!
//! Measures the two expensive fixed points on synthetic shapes:
//! - a long straight-line block (pure LVN throughput)
//! - a chain of diamonds (merge-heavy)
//! - nested loops with field traffic (fixed-point convergence)

extern crate miropt;

use criterion::{criterion_group, criterion_main, Criterion};
use miropt::analysis::SsaBuilder;
use miropt::mir::{BinaryOp, Instruction, MethodBuilder, MirMethod, VarId};
use miropt::opt::{gvn::GlobalValueNumbering, CheckEliminator, EventLog};
use std::hint::black_box;

/// One block of repeated field reads and arithmetic.
fn straight_line(length: usize) -> MirMethod {
    let mut b = MethodBuilder::new(4);
    let class = b.class();
    let field = b.instance_field(class, false);
    let body = b.code_block();
    b.set_fall_through(b.entry(), body);
    for _ in 0..length {
        b.push(body, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(
            body,
            Instruction::binary(BinaryOp::Add, VarId::new(2), VarId::new(1), VarId::new(1)),
        );
    }
    b.push(body, Instruction::ret(Some(VarId::new(2))));
    b.set_fall_through(body, b.exit());
    b.finish().expect("valid graph")
}

/// A chain of `count` diamonds, each writing the field in one arm.
fn diamond_chain(count: usize) -> MirMethod {
    let mut b = MethodBuilder::new(5);
    let class = b.class();
    let field = b.instance_field(class, false);
    let mut current = b.code_block();
    b.set_fall_through(b.entry(), current);
    for _ in 0..count {
        let left = b.code_block();
        let right = b.code_block();
        let join = b.code_block();
        b.push(current, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(current, Instruction::if_zero(VarId::new(1)));
        b.set_fall_through(current, left);
        b.set_taken(current, right);
        b.push(left, Instruction::konst(VarId::new(2), 7));
        b.push(left, Instruction::iput(VarId::new(2), VarId::new(0), field));
        b.push(left, Instruction::goto());
        b.set_fall_through(left, join);
        b.push(right, Instruction::goto());
        b.set_fall_through(right, join);
        current = join;
    }
    b.push(current, Instruction::ret(None));
    b.set_fall_through(current, b.exit());
    b.finish().expect("valid graph")
}

/// `depth` nested loops, each level touching the field and the array.
fn nested_loops(depth: usize) -> MirMethod {
    let mut b = MethodBuilder::new(8);
    let class = b.class();
    let field = b.instance_field(class, false);
    let mut headers = Vec::new();
    let mut previous = b.entry();
    for _ in 0..depth {
        let header = b.code_block();
        b.set_fall_through(previous, header);
        b.push(header, Instruction::iget(VarId::new(1), VarId::new(0), field));
        b.push(header, Instruction::if_zero(VarId::new(1)));
        headers.push(header);
        previous = header;
    }
    let innermost = b.code_block();
    b.set_fall_through(previous, innermost);
    b.push(innermost, Instruction::konst(VarId::new(2), 0));
    b.push(
        innermost,
        Instruction::aget(VarId::new(3), VarId::new(4), VarId::new(2)),
    );
    b.push(innermost, Instruction::iput(VarId::new(3), VarId::new(0), field));
    b.push(innermost, Instruction::goto());
    b.set_fall_through(innermost, headers[depth - 1]);
    // Each header's exit edge feeds the next-outer back edge, the
    // outermost one the method exit.
    let tail = b.code_block();
    for (level, &header) in headers.iter().enumerate() {
        if level == 0 {
            b.set_taken(header, tail);
        } else {
            b.set_taken(header, headers[level - 1]);
        }
    }
    b.push(tail, Instruction::ret(None));
    b.set_fall_through(tail, b.exit());
    b.finish().expect("valid graph")
}

fn run_pipeline(mut method: MirMethod) -> MirMethod {
    SsaBuilder::build(&mut method).expect("SSA construction");
    let mut events = EventLog::new();
    let mut gvn = GlobalValueNumbering::number(&method, &mut events).expect("numbering");
    gvn.apply(&mut method, CheckEliminator::all(), &mut events)
        .expect("elimination");
    method
}

fn bench_straight_line(c: &mut Criterion) {
    c.bench_function("gvn_straight_line_500", |b| {
        b.iter(|| black_box(run_pipeline(straight_line(500))));
    });
}

fn bench_diamond_chain(c: &mut Criterion) {
    c.bench_function("gvn_diamond_chain_50", |b| {
        b.iter(|| black_box(run_pipeline(diamond_chain(50))));
    });
}

fn bench_nested_loops(c: &mut Criterion) {
    c.bench_function("gvn_nested_loops_8", |b| {
        b.iter(|| black_box(run_pipeline(nested_loops(8))));
    });
}

criterion_group!(
    benches,
    bench_straight_line,
    bench_diamond_chain,
    bench_nested_loops
);
criterion_main!(benches);

//! The pass interface for the pass-scheduling collaborator.
//!
//! A [`MirPass`] transforms one method and reports an explicit
//! [`PassResult`] - passes never communicate through shared mutable state.
//! The scheduler drives `gate` → `start` → `run` → `end` per method;
//! [`run_passes`] is the reference driver, including the fallback contract:
//! a pass failing with
//! [`Error::UnsupportedMethod`](crate::Error::UnsupportedMethod) marks the
//! method for the unoptimized fallback path and logs the event instead of
//! failing the build, while invariant violations propagate as hard errors.

use crate::{
    mir::MirMethod,
    opt::{EventKind, EventLog},
    Error, Result,
};

/// Explicit outcome of one pass invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassResult {
    /// The pass changed nothing.
    Unchanged,
    /// The pass mutated the method.
    Changed,
}

impl PassResult {
    /// Returns `true` for [`PassResult::Changed`].
    #[must_use]
    pub const fn changed(self) -> bool {
        matches!(self, Self::Changed)
    }
}

/// One method-level optimization pass.
pub trait MirPass {
    /// Short, stable pass name.
    fn name(&self) -> &'static str;

    /// One-line description.
    fn description(&self) -> &'static str;

    /// Returns `false` to skip this method entirely.
    fn gate(&self, method: &MirMethod) -> bool {
        !method.requires_fallback()
    }

    /// Whole-method hook before the per-block work.
    fn start(&self, _method: &mut MirMethod) -> Result<()> {
        Ok(())
    }

    /// The pass body.
    fn run(&self, method: &mut MirMethod, events: &mut EventLog) -> Result<PassResult>;

    /// Whole-method hook after the per-block work.
    fn end(&self, _method: &mut MirMethod) -> Result<()> {
        Ok(())
    }
}

/// Runs a pass list over one method, threading results explicitly.
///
/// Returns `true` if any pass changed the method. An
/// [`Error::UnsupportedMethod`] from any hook marks the method for the
/// unoptimized fallback path, records [`EventKind::FallbackMarked`], and
/// stops optimizing this method - slower generated code, not a build
/// failure. All other errors propagate.
pub fn run_passes(
    method: &mut MirMethod,
    passes: &[&dyn MirPass],
    events: &mut EventLog,
) -> Result<bool> {
    fn run_one(
        pass: &dyn MirPass,
        method: &mut MirMethod,
        events: &mut EventLog,
    ) -> Result<PassResult> {
        pass.start(method)?;
        let result = pass.run(method, events)?;
        pass.end(method)?;
        Ok(result)
    }

    let mut any_changed = false;
    for pass in passes {
        if !pass.gate(method) {
            continue;
        }
        match run_one(*pass, method, events) {
            Ok(result) => any_changed |= result.changed(),
            Err(Error::UnsupportedMethod { message }) => {
                method.mark_fallback();
                events
                    .record(EventKind::FallbackMarked)
                    .message(format!("{}: {message}", pass.name()));
                return Ok(any_changed);
            }
            Err(other) => return Err(other),
        }
    }
    Ok(any_changed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mir::{Instruction, MethodBuilder, VarId};

    struct CountingPass {
        result: PassResult,
    }

    impl MirPass for CountingPass {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn description(&self) -> &'static str {
            "test pass"
        }

        fn run(&self, _method: &mut MirMethod, events: &mut EventLog) -> Result<PassResult> {
            events.record(EventKind::FixedPointPass);
            Ok(self.result)
        }
    }

    struct UnsupportedPass;

    impl MirPass for UnsupportedPass {
        fn name(&self) -> &'static str {
            "unsupported"
        }

        fn description(&self) -> &'static str {
            "always bails"
        }

        fn run(&self, _method: &mut MirMethod, _events: &mut EventLog) -> Result<PassResult> {
            Err(Error::unsupported("register width mismatch"))
        }
    }

    fn trivial_method() -> MirMethod {
        let mut b = MethodBuilder::new(1);
        let body = b.code_block();
        b.set_fall_through(b.entry(), body);
        b.push(body, Instruction::konst(VarId::new(0), 0));
        b.push(body, Instruction::ret(Some(VarId::new(0))));
        b.set_fall_through(body, b.exit());
        b.finish().unwrap()
    }

    #[test]
    fn test_results_threaded() {
        let mut method = trivial_method();
        let mut events = EventLog::new();
        let changed = run_passes(
            &mut method,
            &[
                &CountingPass {
                    result: PassResult::Unchanged,
                },
                &CountingPass {
                    result: PassResult::Changed,
                },
            ],
            &mut events,
        )
        .unwrap();
        assert!(changed);
        assert_eq!(events.count(EventKind::FixedPointPass), 2);
    }

    #[test]
    fn test_unsupported_marks_fallback() {
        let mut method = trivial_method();
        let mut events = EventLog::new();
        let changed = run_passes(&mut method, &[&UnsupportedPass], &mut events).unwrap();
        assert!(!changed);
        assert!(method.requires_fallback());
        assert_eq!(events.count(EventKind::FallbackMarked), 1);
    }

    #[test]
    fn test_gate_skips_fallback_methods() {
        let mut method = trivial_method();
        method.mark_fallback();
        let mut events = EventLog::new();
        run_passes(
            &mut method,
            &[&CountingPass {
                result: PassResult::Changed,
            }],
            &mut events,
        )
        .unwrap();
        assert!(events.is_empty());
    }
}

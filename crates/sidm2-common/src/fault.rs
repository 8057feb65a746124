//! Emulation faults.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::Address;

/// Reason an emulation run halted.
///
/// Faults are recorded, never panicked on: the caller decides whether a
/// truncated run is acceptable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
pub enum Fault {
    /// Control reached address `$0000`, i.e. the player branched into
    /// unmapped or zeroed memory.
    #[error("execution reached $0000 from {from} in frame {frame}")]
    ExecutionAtZero {
        /// Frame being executed (0 = init).
        frame: u32,
        /// Address of the instruction that transferred control.
        from: Address,
    },
    /// An undocumented or jamming opcode was fetched.
    #[error("illegal opcode ${opcode:02X} at {address} in frame {frame}")]
    IllegalOpcode {
        /// Frame being executed.
        frame: u32,
        /// Opcode byte.
        opcode: u8,
        /// Address of the opcode.
        address: Address,
    },
    /// The routine did not return within its instruction budget.
    #[error("routine at {entry} exceeded {budget} instructions in frame {frame}")]
    InstructionBudget {
        /// Frame being executed.
        frame: u32,
        /// Routine entry point.
        entry: Address,
        /// Budget that was exhausted.
        budget: u32,
    },
}

impl Fault {
    /// Frame in which the fault happened.
    pub fn frame(&self) -> u32 {
        match self {
            Fault::ExecutionAtZero { frame, .. }
            | Fault::IllegalOpcode { frame, .. }
            | Fault::InstructionBudget { frame, .. } => *frame,
        }
    }

    /// Address most relevant for reproducing the fault.
    pub fn address(&self) -> Address {
        match self {
            Fault::ExecutionAtZero { from, .. } => *from,
            Fault::IllegalOpcode { address, .. } => *address,
            Fault::InstructionBudget { entry, .. } => *entry,
        }
    }

    /// Whether this fault is the infinite-loop guard rather than a crash.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Fault::InstructionBudget { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_locate_the_fault() {
        let fault = Fault::IllegalOpcode {
            frame: 3,
            opcode: 0x02,
            address: Address(0x1234),
        };
        assert_eq!(fault.to_string(), "illegal opcode $02 at $1234 in frame 3");
        assert_eq!(fault.address(), Address(0x1234));

        let err: Box<dyn std::error::Error> = Box::new(Fault::InstructionBudget {
            frame: 0,
            entry: Address(0x1000),
            budget: 500,
        });
        assert_eq!(
            err.to_string(),
            "routine at $1000 exceeded 500 instructions in frame 0"
        );
        assert!(
            Fault::ExecutionAtZero {
                frame: 1,
                from: Address(0x2000)
            }
            .to_string()
            .contains("from $2000")
        );
    }
}

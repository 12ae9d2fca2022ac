//! Extraction of emitted events from LOG instructions.

use crate::{
    step::{EventDesc, StepVmState},
    utils::{self, opcode},
};

/// Extracts the event a LOG-N step is about to emit: the payload sliced from
/// memory and the N topics read off the operand stack in declaration order.
/// Non-LOG steps and malformed stacks yield `None`.
pub fn extract_event(state: &StepVmState) -> Option<EventDesc> {
    let topic_count = opcode::log_topic_count(state.op)?;

    let offset = utils::to_usize_saturated(state.peek(0)?);
    let size = utils::to_usize_saturated(state.peek(1)?);
    let payload = utils::mem_slice(&state.memory, offset, size);

    let topics = (0..topic_count).map(|i| state.peek(2 + i)).collect::<Option<Vec<_>>>()?;

    Some(EventDesc { payload, topics })
}

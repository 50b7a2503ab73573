//! Single-slot register for the tool invocation currently being assembled.
//!
//! The model serializes tool calls: a `toolUse` event is followed by the
//! `contentEnd` that closes it. A second `toolUse` before that `contentEnd`
//! overwrites the first capture.

use parking_lot::Mutex;
use tracing::warn;

use crate::core::tools::ToolInvocation;

#[derive(Debug, Default)]
pub struct InvocationRegister {
    slot: Mutex<Option<ToolInvocation>>,
}

impl InvocationRegister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `invocation`, returning the capture it replaced, if any.
    pub fn capture(&self, invocation: ToolInvocation) -> Option<ToolInvocation> {
        let replaced = self.slot.lock().replace(invocation);
        if let Some(previous) = &replaced {
            warn!(
                tool = %previous.tool_name,
                tool_use_id = ?previous.tool_use_id,
                "Tool use overwritten before its content end arrived"
            );
        }
        replaced
    }

    /// Consume the captured invocation.
    pub fn take(&self) -> Option<ToolInvocation> {
        self.slot.lock().take()
    }
}

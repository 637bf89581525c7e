mod block_stack;
mod call_stack;
mod value_stack;

pub(crate) use block_stack::{BlockFrame, BlockStack, BlockType};
pub(crate) use call_stack::{CallFrame, CallStack};
pub(crate) use value_stack::ValueStack;

/// The explicit state of one interpreter invocation.
#[derive(Debug, Default)]
pub(crate) struct Stack<'a> {
    pub(crate) values: ValueStack,
    pub(crate) blocks: BlockStack,
    pub(crate) call_stack: CallStack<'a>,
}

#[cold]
pub(crate) fn underflow(what: &str) -> crate::Error {
    crate::Error::Other(alloc::format!("{what} stack underflow"))
}

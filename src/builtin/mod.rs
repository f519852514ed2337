//! Ready-made tasks.

mod command;
mod file;
mod interrupt;
mod print;
mod wait;

pub use command::{Command, CommandError, Service};
pub use file::FileCopy;
pub use interrupt::{Interrupt, Interrupted};
pub use print::Print;
pub use wait::Wait;

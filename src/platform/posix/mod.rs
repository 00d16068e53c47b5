mod fd;
pub(crate) use self::fd::{read, write, Fd};

mod poll;
pub(crate) use self::poll::PollFile;

pub mod fcfs;
pub mod max_min;
pub mod mct;
pub mod min_min;
pub mod round_robin;

pub use fcfs::FcfsScheduler;
pub use max_min::MaxMinScheduler;
pub use mct::MctScheduler;
pub use min_min::MinMinScheduler;
pub use round_robin::RoundRobinScheduler;

pub mod protocol;
pub mod task;
pub mod verdict;
pub mod worker;

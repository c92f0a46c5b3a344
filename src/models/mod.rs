pub mod extraction;
pub mod job;
pub mod upload;
pub mod verdict;

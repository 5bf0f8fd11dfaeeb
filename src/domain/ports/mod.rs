//! Domain ports (interfaces) for the orchestration core.

pub mod cluster_gateway;
pub mod job_watcher;
pub mod namespace_repository;
pub mod queue_repository;
pub mod task_repository;
pub mod token_bucket_repository;

pub use cluster_gateway::{AlgorithmResult, BuildSource, ClusterGateway, DatapackRef, FakeClusterGateway, ImageRef};
pub use job_watcher::{FakeJobWatcher, JobOutcome, JobWatcher};
pub use namespace_repository::NamespaceRepository;
pub use queue_repository::QueueRepository;
pub use task_repository::{TaskFilter, TaskPage, TaskRepository};
pub use token_bucket_repository::TokenBucketRepository;

pub mod manager;

pub use manager::{ContainerStatus, DockerRuntime};

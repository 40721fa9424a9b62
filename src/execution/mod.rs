//! Docker execution layer for candidate programs.
//!
//! This module provides the sandbox used by level 3 of the evaluator,
//! built on the bollard crate for container lifecycle management and
//! host-enforced resource control.
//!
//! # Architecture
//!
//! Container states follow this lifecycle:
//! ```text
//! PENDING → CREATING → RUNNING → COMPLETED/FAILED/TIMEOUT → CLEANUP
//! ```
//!
//! # Example
//!
//! ```ignore
//! use reason_forge::execution::{connect_sandbox, SandboxConfig};
//!
//! let sandbox = connect_sandbox(SandboxConfig::default())?;
//! let result = sandbox.execute("def f():\n    return 1", "    assert f() == 1").await;
//! assert!(result.success());
//! ```

pub mod container;
pub mod docker_client;
pub mod resources;
pub mod sandbox;

pub use container::{Container, ContainerStatus};
pub use docker_client::{ContainerTemplate, DockerClient, ExecResult};
pub use resources::{parse_memory_limit, ExecutionLimits};
pub use sandbox::{
    combine_program, connect_sandbox, EphemeralSandbox, PersistentSandbox, Sandbox,
    SandboxConfig, SandboxStrategy,
};

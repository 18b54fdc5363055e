//! Mocking layer: interception plus scoped server lifecycles

mod decorator;
pub mod interceptor;
mod scope;

pub use decorator::{try_with_sftpmock, with_sftpmock, with_sftpmock_async};
pub use interceptor::{HostPortTable, InterceptorPatch, RedirectResolver, install};
pub use scope::{ActiveScope, MockSftpServers, ScopeStatus};

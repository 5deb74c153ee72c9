mod registry;
mod request;
mod result;
mod traits;

pub use registry::{AgentRegistry, OverwritePolicy};
pub use request::Request;
pub(crate) use request::type_name;
pub use result::AgentResult;
pub use traits::{AgentInfo, BaseAgent};

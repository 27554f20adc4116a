pub mod format;
pub mod hostname;
pub mod render;
pub mod template;
pub mod types;

pub use format::{FieldExpressions, SyslogFormat, TemplateStore};
pub use hostname::HostIdentity;
pub use render::{Priority, RecordProjection, RenderContext};
pub use template::Template;
pub use types::{LogRecord, ProcessInfo};

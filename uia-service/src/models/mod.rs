pub mod flow;
pub mod session;
pub mod stage;
pub mod user;

pub use flow::{AuthFlow, any_flow_satisfied};
pub use session::AuthSession;
pub use stage::StageType;
pub use user::RegisteredUser;

pub mod events;
pub mod flow;
pub mod google;
pub mod ports;
pub mod state;

pub use events::{
    AuditLogSubscriber, EventNotifier, LoginSubscriber, NotifyError, UserLoggedIn, UserLoggedOut,
};
pub use flow::{FlowResponse, LoginFlowController, RouteUrls, SigninPage};
pub use google::GoogleApiClient;
pub use ports::*;
pub use state::{decode_state, encode_state, AuthorizationState, StateParams};

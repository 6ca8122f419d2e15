pub mod domain;
pub mod error;
pub mod ports;
pub mod prompt;
pub mod session;
pub mod stream;

#[cfg(test)]
mod testing;

pub use domain::{
    AuthState, ChatLogEntry, ConversationSession, Feedback, PatientFields, PatientInfo, Speaker,
    SignupFields, Turn, UserAccount,
};
pub use error::{SessionError, ValidationError};
pub use ports::{
    ConversationLogStore, CredentialStore, FragmentStream, InferenceService, PasswordService,
    PortError, PortResult,
};
pub use prompt::{PromptAssembler, PromptEncoding, PromptPayload, PromptTemplate, TemplateVariant};
pub use session::{Answer, Persistence, SessionConfig, SessionController, SessionServices, TurnReceipt};

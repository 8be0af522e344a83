pub mod gate;
pub mod producer;
pub mod subject;

pub use gate::{Access, Gate, GateError, GateHandle, Handle, RwGate};
pub use producer::pump;
pub use subject::{Observer, Source, Subject, SubjectSubscription, Subscription};

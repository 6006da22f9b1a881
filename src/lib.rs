pub mod attendance;
pub mod capture;
pub mod config;
pub mod error;
pub mod memory;
pub mod presence;
pub mod reactions;
pub mod session;
pub mod transport;
pub mod upload;

pub use attendance::{AttendanceLedger, AttendanceRecord, AttendanceStore, VisitGuard};
pub use capture::{
    BindOutcome, BindRequest, CameraFacing, CaptureArtifact, CaptureConfig, CaptureController,
    CaptureDevice, CaptureState, DeviceEvent, DeviceProbe, LiveSessionLink, MediaKind,
    RecordedMedia, SimulatedDevice,
};
pub use config::Config;
pub use error::{CaptureError, ChannelError, ObjectStoreError, StoreError, UploadError};
pub use memory::{MemoryBackend, MemoryBackendConfig};
pub use presence::{PresenceConfig, PresenceHandle, PresenceTracker};
pub use reactions::{
    ReactionAggregator, ReactionCounts, ReactionKind, ReactionRow, ReactionStore,
};
pub use session::{
    NewSession, Session, SessionEnd, SessionId, SessionRef, SessionStatus, SessionStore, UserId,
};
pub use transport::{
    MembershipSnapshot, NatsTransport, NatsTransportConfig, PresenceSubscription, ReactionEvent,
    RealtimeTransport,
};
pub use upload::{ObjectStore, UploadHandle, UploadPipeline, AVATAR_TTL, RECORDING_TTL};

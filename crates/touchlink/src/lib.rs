//! # TouchLink
//!
//! HMD session orchestration: one VR runtime session feeding the compositor
//! with stereo frames, predicted poses for the headset, both hand controllers
//! and auxiliary tracked objects, and a background watchdog that keeps the
//! session from idling out.
//!
//! ## Features
//!
//! - **Session lifecycle**: Result-based initialization pipeline, per-eye swap
//!   chains and depth targets, panic-safe teardown
//! - **Pose polling**: predicted poses written into a joint map keyed by a
//!   stable identity
//! - **Keep-alive watchdog**: cancellable background task driving the vendor
//!   diagnostic tool through a narrow controller trait
//! - **Host log channel**: `(message, severity)` records mirrored to `log`
//! - **Simulated backend**: in-process runtime and device for demos and tests
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use touchlink::prelude::*;
//! use touchlink::backend::simulated::SimulatedBackend;
//!
//! let mut tracking = TrackingOrchestrator::new(
//!     TouchLinkConfig::default(),
//!     Box::new(SimulatedBackend::new()),
//! );
//! tracking.log_channel().subscribe(|record| println!("{}", record.formatted()));
//!
//! if tracking.initialize() == STATUS_SUCCESS {
//!     for _ in 0..90 {
//!         tracking.update();
//!     }
//!     for joint in tracking.tracked_joints() {
//!         println!("{}: {:?}", joint.name, joint.position());
//!     }
//! }
//! tracking.shutdown();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Configuration
pub mod config;
pub mod core;

// Building blocks
pub mod backend;
pub mod events;
pub mod foundation;

// Orchestration
pub mod session;
pub mod tracking;
pub mod watchdog;

pub use session::{SessionError, SessionManager};
pub use tracking::TrackingOrchestrator;
pub use watchdog::ExternalToolWatchdog;

/// Common imports for orchestrator users
pub mod prelude {
    pub use crate::{
        backend::{BackendFactory, GraphicsDevice, VrRuntime},
        config::Config,
        core::TouchLinkConfig,
        events::{LogChannel, LogRecord, Severity},
        foundation::math::{Pose, PoseState, Quat, Vec3},
        tracking::{
            JointId, StatusCode, TrackedJoint, TrackingOrchestrator, SHUTDOWN_FAILED,
            STATUS_INIT_FAILED, STATUS_NOT_STARTED, STATUS_SUCCESS,
        },
        watchdog::{ExternalToolController, WatchdogState},
    };
}

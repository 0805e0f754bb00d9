pub use crate::matchwire::conversation::{DeliveryStatus, Message};
pub use crate::matchwire::deck::{ProfileCard, SwipeDirection, SwipeFeedback};
pub use crate::matchwire::error::{MatchwireError, Result};
pub use crate::matchwire::matches::MatchSummary;
pub use crate::matchwire::streams::{ConversationUpdate, UpdateTrigger};
pub use crate::matchwire::subscriptions::{Channel, SubscriptionHandle};
pub use crate::matchwire::typing::ComposerConfig;
pub use crate::matchwire::{Matchwire, MatchwireConfig};
pub use crate::transport::{Transport, TransportError, TransportHandle};
pub use crate::types::PushEvent;

use std::sync::{Mutex, OnceLock};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{filter::EnvFilter, fmt::Layer, prelude::*, registry::Registry};

mod matchwire;
pub mod transport;
mod types;

static TRACING_GUARDS: OnceLock<Mutex<Option<(WorkerGuard, WorkerGuard)>>> = OnceLock::new();
static TRACING_INIT: OnceLock<()> = OnceLock::new();

fn init_tracing(logs_dir: &std::path::Path) {
    TRACING_INIT.get_or_init(|| {
        let file_appender = tracing_appender::rolling::RollingFileAppender::builder()
            .rotation(tracing_appender::rolling::Rotation::DAILY)
            .filename_prefix("matchwire")
            .filename_suffix("log")
            .build(logs_dir)
            .expect("Failed to create file appender");

        let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);
        let (non_blocking_stdout, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());

        TRACING_GUARDS
            .set(Mutex::new(Some((file_guard, stdout_guard))))
            .ok();

        let stdout_layer = Layer::new()
            .with_writer(non_blocking_stdout)
            .with_ansi(true)
            .with_target(true);

        let file_layer = Layer::new()
            .with_writer(non_blocking_file)
            .with_ansi(false)
            .with_target(true);

        Registry::default()
            .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
            .with(stdout_layer)
            .with(file_layer)
            .init();
    });
}

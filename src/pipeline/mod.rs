pub mod event;
pub mod executor;
pub mod filters;
pub mod registry;

use tokio::sync::mpsc;
use event::LogEvent;

pub type PipelineSender = mpsc::Sender<LogEvent>;
pub type PipelineReceiver = mpsc::Receiver<LogEvent>;

pub fn create_pipeline_channel(buffer_size: usize) -> (PipelineSender, PipelineReceiver) {
    mpsc::channel(buffer_size)
}

use super::metrics::GenerationMetrics;
use log::info;

pub trait ProgressCallback: Send {
    fn on_generation_start(&mut self, generation: usize);
    fn on_generation_complete(&mut self, metrics: &GenerationMetrics);
    fn on_offspring_evaluated(&mut self, evaluated: usize, total: usize);
    fn on_stop(&mut self, _generation: usize, _reason: StopReason) {}
}

impl<T: ProgressCallback + ?Sized> ProgressCallback for &mut T {
    fn on_generation_start(&mut self, generation: usize) {
        (**self).on_generation_start(generation);
    }

    fn on_generation_complete(&mut self, metrics: &GenerationMetrics) {
        (**self).on_generation_complete(metrics);
    }

    fn on_offspring_evaluated(&mut self, evaluated: usize, total: usize) {
        (**self).on_offspring_evaluated(evaluated, total);
    }

    fn on_stop(&mut self, generation: usize, reason: StopReason) {
        (**self).on_stop(generation, reason);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    Completed,
    EarlyStopped,
    BudgetExhausted,
}

/// Reports through the `log` facade.
pub struct LogProgressCallback;

impl ProgressCallback for LogProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        info!("Generation {} starting...", generation);
    }

    fn on_generation_complete(&mut self, m: &GenerationMetrics) {
        info!(
            "Generation {} complete. Mean: {:.4}, top1: {:.4}, unique: {:.2}, oracle calls: {}",
            m.generation, m.mean, m.top1, m.unique, m.oracle_calls
        );
    }

    fn on_offspring_evaluated(&mut self, evaluated: usize, total: usize) {
        info!("  Evaluated {}/{} offspring", evaluated, total);
    }

    fn on_stop(&mut self, generation: usize, reason: StopReason) {
        info!("Search stopped after generation {}: {:?}", generation, reason);
    }
}

pub struct NoProgress;

impl ProgressCallback for NoProgress {
    fn on_generation_start(&mut self, _generation: usize) {}
    fn on_generation_complete(&mut self, _metrics: &GenerationMetrics) {}
    fn on_offspring_evaluated(&mut self, _evaluated: usize, _total: usize) {}
}

// For driving a UI or another thread
pub struct ChannelProgressCallback {
    sender: std::sync::mpsc::Sender<ProgressMessage>,
}

#[derive(Debug, Clone)]
pub enum ProgressMessage {
    GenerationStart(usize),
    GenerationComplete(GenerationMetrics),
    OffspringEvaluated { evaluated: usize, total: usize },
    Stopped { generation: usize, reason: StopReason },
}

impl ChannelProgressCallback {
    pub fn new(sender: std::sync::mpsc::Sender<ProgressMessage>) -> Self {
        Self { sender }
    }
}

impl ProgressCallback for ChannelProgressCallback {
    fn on_generation_start(&mut self, generation: usize) {
        let _ = self.sender.send(ProgressMessage::GenerationStart(generation));
    }

    fn on_generation_complete(&mut self, metrics: &GenerationMetrics) {
        let _ = self.sender.send(ProgressMessage::GenerationComplete(metrics.clone()));
    }

    fn on_offspring_evaluated(&mut self, evaluated: usize, total: usize) {
        let _ = self
            .sender
            .send(ProgressMessage::OffspringEvaluated { evaluated, total });
    }

    fn on_stop(&mut self, generation: usize, reason: StopReason) {
        let _ = self.sender.send(ProgressMessage::Stopped { generation, reason });
    }
}

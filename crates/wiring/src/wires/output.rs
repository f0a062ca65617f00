use std::fmt;
use std::sync::{Arc, RwLock, Weak};

use tracing::debug;

use crate::error::WiringError;
use crate::model::graph::VertexKind;
use crate::model::ModelShared;

use super::input::InputWire;
use super::solder::SolderType;

type Forwarder<O> = Arc<dyn Fn(O) + Send + Sync>;

struct OutputWireInner<O> {
    /// Vertex this wire leaves from: a scheduler name, or `Heartbeat`.
    source: String,
    model: Weak<ModelShared>,
    /// Replaced, never mutated in place, so `forward` only holds the lock
    /// long enough to clone the `Arc`.
    forwarders: RwLock<Arc<[Forwarder<O>]>>,
}

/// Exit point of a scheduler. Everything forwarded here is delivered to every
/// soldered destination, in solder order.
pub struct OutputWire<O> {
    inner: Arc<OutputWireInner<O>>,
}

impl<O> Clone for OutputWire<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O> fmt::Debug for OutputWire<O> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputWire")
            .field("source", &self.inner.source)
            .field("destinations", &self.destination_count())
            .finish()
    }
}

impl<O> OutputWire<O> {
    pub(crate) fn new(source: impl Into<String>, model: Weak<ModelShared>) -> Self {
        Self {
            inner: Arc::new(OutputWireInner {
                source: source.into(),
                model,
                forwarders: RwLock::new(Arc::from(Vec::new())),
            }),
        }
    }

    /// Name of the vertex this wire leaves from.
    pub fn source(&self) -> &str {
        &self.inner.source
    }

    pub fn destination_count(&self) -> usize {
        self.inner
            .forwarders
            .read()
            .map(|f| f.len())
            .unwrap_or_default()
    }
}

impl<O: Clone + Send + 'static> OutputWire<O> {
    /// Deliver every item forwarded here to `input`.
    pub fn solder_to<X>(
        &self,
        input: &InputWire<O, X>,
        solder_type: SolderType,
    ) -> Result<(), WiringError>
    where
        X: Clone + Send + 'static,
    {
        self.register_edge(
            input.scheduler_name(),
            VertexKind::Scheduler,
            input.name(),
            solder_type,
        )?;

        let target = input.downgrade();
        self.push(Arc::new(move |item: O| {
            let Some(wire) = target.upgrade() else {
                return;
            };
            let delivered = match solder_type {
                SolderType::Put => wire.put(item),
                SolderType::Offer => wire.offer(item).map(|_| ()),
                SolderType::Inject => wire.inject(item),
            };
            if let Err(e) = delivered {
                debug!(
                    scheduler = wire.scheduler_name(),
                    wire = wire.name(),
                    error = %e,
                    "dropped forwarded item"
                );
            }
        }));
        Ok(())
    }

    /// Deliver every item forwarded here to a plain function, called on the
    /// forwarding thread. Recorded in the wiring graph as a sink vertex
    /// named `label`.
    pub fn solder_to_fn<F>(
        &self,
        label: &str,
        input_label: &str,
        f: F,
    ) -> Result<(), WiringError>
    where
        F: Fn(O) + Send + Sync + 'static,
    {
        self.register_edge(label, VertexKind::Sink, input_label, SolderType::Put)?;
        self.push(Arc::new(f));
        Ok(())
    }

    /// Send an item to every destination. Each destination but the last
    /// receives a clone.
    pub fn forward(&self, item: O) {
        let forwarders = {
            let guard = self
                .inner
                .forwarders
                .read()
                .unwrap_or_else(|e| e.into_inner());
            Arc::clone(&*guard)
        };
        if let Some((last, rest)) = forwarders.split_last() {
            for forwarder in rest {
                forwarder(item.clone());
            }
            last(item);
        }
    }

    fn register_edge(
        &self,
        target: &str,
        kind: VertexKind,
        label: &str,
        solder_type: SolderType,
    ) -> Result<(), WiringError> {
        let model = self
            .inner
            .model
            .upgrade()
            .ok_or_else(|| WiringError::Stopped(self.inner.source.clone()))?;
        model.record_edge(&self.inner.source, target, kind, label, solder_type)
    }

    fn push(&self, forwarder: Forwarder<O>) {
        let mut forwarders = self
            .inner
            .forwarders
            .write()
            .unwrap_or_else(|e| e.into_inner());
        let extended: Vec<Forwarder<O>> = forwarders
            .iter()
            .cloned()
            .chain(std::iter::once(forwarder))
            .collect();
        *forwarders = extended.into();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;
    use std::time::Duration;

    use crate::model::WiringModel;

    #[test]
    fn soldering_is_not_blocked_by_a_forward_in_progress() {
        let model = WiringModel::builder()
            .with_health_monitor_enabled(false)
            .build()
            .unwrap();
        let scheduler = model.scheduler_builder::<u32>("source").unwrap().build().unwrap();
        let output = scheduler.output_wire();

        let (entered_tx, entered_rx) = crossbeam_channel::bounded::<()>(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);
        output
            .solder_to_fn("slow", "items", move |_| {
                entered_tx.send(()).unwrap();
                release_rx.recv().unwrap();
            })
            .unwrap();

        let forwarding = {
            let output = output.clone();
            thread::spawn(move || output.forward(1))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        // The first destination is still running.
        let late = std::sync::Arc::new(AtomicUsize::new(0));
        {
            let late = late.clone();
            output
                .solder_to_fn("late", "items", move |x| {
                    late.fetch_add(x as usize, Ordering::SeqCst);
                })
                .unwrap();
        }
        assert_eq!(output.destination_count(), 2);

        release_tx.send(()).unwrap();
        forwarding.join().unwrap();
        assert_eq!(late.load(Ordering::SeqCst), 0, "snapshot taken before the late solder");
    }
}

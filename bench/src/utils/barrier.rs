use crate::error::BarrierError;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GenerationState {
    Pending,
    Released,
    Broken,
}

/// One trip of the barrier. Every generation ends exactly once, either
/// released by the last arriving party or broken.
struct Generation {
    state: watch::Sender<GenerationState>,
}

impl Generation {
    fn new() -> Arc<Self> {
        let (state, _) = watch::channel(GenerationState::Pending);
        Arc::new(Self { state })
    }

    fn current(&self) -> GenerationState {
        *self.state.borrow()
    }

    /// Returns false when the generation had already ended.
    fn end(&self, outcome: GenerationState) -> bool {
        self.state.send_if_modified(|state| {
            if *state == GenerationState::Pending {
                *state = outcome;
                true
            } else {
                false
            }
        })
    }
}

struct BarrierState {
    arrived: usize,
    current: Arc<Generation>,
}

/// Reusable rendezvous point for a fixed number of parties. Nobody passes
/// until all parties have arrived, and a broken barrier releases every
/// waiter with an error instead of leaving it blocked.
pub struct RendezvousBarrier {
    parties: usize,
    state: Mutex<BarrierState>,
}

impl RendezvousBarrier {
    pub fn new(parties: usize) -> Self {
        Self {
            parties: parties.max(1),
            state: Mutex::new(BarrierState {
                arrived: 0,
                current: Generation::new(),
            }),
        }
    }

    pub fn parties(&self) -> usize {
        self.parties
    }

    pub async fn wait(&self) -> Result<(), BarrierError> {
        let (generation, mut receiver) = {
            let mut state = self.lock();
            let generation = state.current.clone();
            if generation.current() == GenerationState::Broken {
                return Err(BarrierError::Broken);
            }
            state.arrived += 1;
            if state.arrived == self.parties {
                generation.end(GenerationState::Released);
                state.arrived = 0;
                state.current = Generation::new();
                return Ok(());
            }
            let receiver = generation.state.subscribe();
            (generation, receiver)
        };

        let mut arrival = PendingArrival {
            barrier: self,
            generation: &generation,
            armed: true,
        };
        let outcome = receiver
            .wait_for(|state| *state != GenerationState::Pending)
            .await
            .map(|state| *state);
        arrival.armed = false;
        match outcome {
            Ok(GenerationState::Released) => Ok(()),
            _ => Err(BarrierError::Broken),
        }
    }

    /// Waits at most `duration`, breaking the barrier for everyone on expiry.
    pub async fn wait_timeout(&self, duration: Duration) -> Result<(), BarrierError> {
        let generation = self.lock().current.clone();
        match timeout(duration, self.wait()).await {
            Ok(result) => result,
            Err(_) => self.expire(&generation),
        }
    }

    /// The last party may have released the generation after the timer fired,
    /// that generation counts as passed and the next one is left intact.
    fn expire(&self, generation: &Arc<Generation>) -> Result<(), BarrierError> {
        self.break_generation(generation);
        match generation.current() {
            GenerationState::Released => Ok(()),
            _ => Err(BarrierError::TimedOut),
        }
    }

    pub fn break_barrier(&self) {
        let generation = self.lock().current.clone();
        self.break_generation(&generation);
    }

    pub fn is_broken(&self) -> bool {
        self.lock().current.current() == GenerationState::Broken
    }

    /// Opens a fresh generation. Parties still waiting on the old one are
    /// released with an error.
    pub fn reset(&self) {
        let mut state = self.lock();
        state.current.end(GenerationState::Broken);
        state.arrived = 0;
        state.current = Generation::new();
    }

    /// Resolves once the current generation breaks, never if it is released.
    pub async fn broken(&self) {
        let generation = self.lock().current.clone();
        let mut receiver = generation.state.subscribe();
        let _ = receiver
            .wait_for(|state| *state == GenerationState::Broken)
            .await;
    }

    /// Registers an owner that is expected to arrive in the current generation.
    pub fn party(self: &Arc<Self>) -> BarrierParty {
        BarrierParty {
            barrier: self.clone(),
            generation: self.lock().current.clone(),
            arrived: false,
        }
    }

    fn break_generation(&self, generation: &Arc<Generation>) {
        let state = self.lock();
        if Arc::ptr_eq(&state.current, generation) && generation.end(GenerationState::Broken) {
            debug!(
                "Barrier broken with {} of {} parties arrived",
                state.arrived, self.parties
            );
        }
    }

    fn lock(&self) -> MutexGuard<'_, BarrierState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Breaks the generation when a `wait` future is dropped before it ends.
struct PendingArrival<'a> {
    barrier: &'a RendezvousBarrier,
    generation: &'a Arc<Generation>,
    armed: bool,
}

impl Drop for PendingArrival<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.barrier.break_generation(self.generation);
        }
    }
}

/// A slot in the barrier owned by one worker. Dropping it without arriving,
/// for example when the worker panics during setup, breaks the barrier.
pub struct BarrierParty {
    barrier: Arc<RendezvousBarrier>,
    generation: Arc<Generation>,
    arrived: bool,
}

impl BarrierParty {
    pub async fn arrive(mut self) -> Result<(), BarrierError> {
        self.arrived = true;
        self.barrier.wait().await
    }

    pub async fn broken(&self) {
        self.barrier.broken().await
    }
}

impl Drop for BarrierParty {
    fn drop(&mut self) {
        if !self.arrived {
            self.barrier.break_generation(&self.generation);
        }
    }
}

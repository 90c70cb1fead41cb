//! Topic catalog and the strategies used to pick from fixed lists.

use std::sync::{Mutex, PoisonError};
use std::sync::atomic::{AtomicUsize, Ordering};

use rand::SeedableRng;
use rand::distr::{Distribution, Uniform};
use rand::rngs::StdRng;

/// Lesson topics a run can be about.
pub const TOPICS: &[&str] = &[
    "Estratégia de Scalping para mini-índice",
    "Como usar o indicador MACD para identificar tendências",
    "A importância do Stop Loss no day trade",
    "Análise de suporte e resistência",
    "Como usar médias móveis no day trade",
    "Padrões de candlestick mais eficazes",
    "Gerenciamento de risco no mercado financeiro",
    "Como identificar breakouts verdadeiros",
    "Estratégias para operar no mini-dólar",
    "Psicologia do trader: controlando as emoções",
    "Volume como confirmação de tendência",
    "Fibonacci no day trade",
    "Horários de maior volatilidade",
    "Como definir metas de lucro",
    "Análise de fluxo de ordens",
];

/// Picks an index into a fixed, non-empty list.
///
/// Used for topic choice and for choosing among fallback scripts, so tests
/// can swap the random default for something deterministic.
pub trait Selector: Send + Sync + std::fmt::Debug {
    /// Returns an index in `0..len`. `len` of zero yields zero.
    fn pick(&self, len: usize) -> usize;
}

/// Uniform pick using the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelector;

impl Selector for RandomSelector {
    fn pick(&self, len: usize) -> usize {
        match Uniform::new(0, len) {
            Ok(dist) => dist.sample(&mut rand::rng()),
            Err(_) => 0,
        }
    }
}

/// Uniform pick from a seeded generator; the same seed replays the same choices.
#[derive(Debug)]
pub struct SeededSelector {
    rng: Mutex<StdRng>,
}

impl SeededSelector {
    /// Creates a selector seeded with `seed`.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl Selector for SeededSelector {
    fn pick(&self, len: usize) -> usize {
        let Ok(dist) = Uniform::new(0, len) else {
            return 0;
        };
        let mut rng = self.rng.lock().unwrap_or_else(PoisonError::into_inner);
        dist.sample(&mut *rng)
    }
}

/// Cycles through the list in order, wrapping around.
#[derive(Debug, Default)]
pub struct RoundRobinSelector {
    next: AtomicUsize,
}

impl RoundRobinSelector {
    /// Creates a selector starting at index `start`.
    pub fn starting_at(start: usize) -> Self {
        Self {
            next: AtomicUsize::new(start),
        }
    }
}

impl Selector for RoundRobinSelector {
    fn pick(&self, len: usize) -> usize {
        if len == 0 {
            return 0;
        }
        self.next.fetch_add(1, Ordering::Relaxed) % len
    }
}

/// Chooses the topic for one run.
pub fn select_topic(selector: &dyn Selector) -> &'static str {
    TOPICS[selector.pick(TOPICS.len()).min(TOPICS.len() - 1)]
}

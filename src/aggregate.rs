//! Parallel map-reduce over pages of input lines.
//!
//! The driver reads fixed-size pages on the calling thread and hands each
//! page to its own scoped worker thread. Workers share nothing mutable: each
//! owns its page and builds its own partial result. The only synchronization
//! point is the join, where partials are folded in dispatch order.
//!
//! At most `max_in_flight` pages run at once. When the window is full the
//! driver joins the oldest page before reading the next one, so finished
//! workers are reaped as dispatch proceeds and thread count stays bounded
//! however long the input is.

use crate::error::{AggregateError, BoxError, ConfigError};
use crate::scan::{explore_lines, fetch_page, Stats, Vocabulary};
use std::any::Any;
use std::collections::VecDeque;
use std::convert::Infallible;
use std::io::BufRead;
use std::ops::AddAssign;
use std::sync::OnceLock;
use std::thread::{self, ScopedJoinHandle};

pub const DEFAULT_PAGE_SIZE: usize = 10_000;
const FALLBACK_MAX_IN_FLIGHT: usize = 4;

/// Settings for a map-reduce run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AggregateConfig {
    /// Maximum number of lines handed to one worker.
    pub page_size: usize,
    /// Maximum number of page workers alive at once.
    pub max_in_flight: usize,
}

impl AggregateConfig {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            page_size,
            ..Self::default()
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: usize) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.page_size == 0 {
            return Err(ConfigError::ZeroPageSize);
        }
        if self.max_in_flight == 0 {
            return Err(ConfigError::ZeroMaxInFlight);
        }
        Ok(())
    }
}

impl Default for AggregateConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            max_in_flight: default_max_in_flight(),
        }
    }
}

/// One worker per available CPU, detected once per process.
pub fn default_max_in_flight() -> usize {
    static MAX_IN_FLIGHT: OnceLock<usize> = OnceLock::new();
    *MAX_IN_FLIGHT.get_or_init(|| {
        thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or_else(|err| {
                log::warn!(
                    "failed to detect CPU count ({}), running {} pages at a time",
                    err,
                    FALLBACK_MAX_IN_FLIGHT
                );
                FALLBACK_MAX_IN_FLIGHT
            })
    })
}

/// Split `reader` into pages, run `page_fn` on up to `max_in_flight` pages
/// concurrently, and fold the partial results with `+=` in dispatch order.
///
/// `A`'s `+=` must be associative and commutative for the result to be
/// independent of page boundaries.
///
/// All dispatched pages are joined before this returns, even on failure.
/// The reported error is the first failing page in dispatch order. A read
/// error, or the OS refusing a worker thread, stops dispatch and is reported
/// only if no page failed.
pub fn map_reduce<R, A, E, F>(
    reader: &mut R,
    config: AggregateConfig,
    page_fn: F,
) -> Result<A, AggregateError>
where
    R: BufRead + ?Sized,
    A: Default + AddAssign + Send,
    E: Into<BoxError>,
    F: Fn(Vec<String>) -> Result<A, E> + Sync,
{
    config.validate()?;
    let page_fn = &page_fn;

    thread::scope(|scope| {
        let mut in_flight: VecDeque<(usize, ScopedJoinHandle<'_, Result<A, BoxError>>)> =
            VecDeque::new();
        let mut fold = Fold::default();
        let mut dispatched = 0;
        let mut stop_error = None;
        loop {
            if in_flight.len() >= config.max_in_flight {
                if let Some((index, task)) = in_flight.pop_front() {
                    fold.join(index, task);
                }
            }
            let page = match fetch_page(config.page_size, reader) {
                Ok(page) => page,
                Err(err) => {
                    log::warn!("stopping dispatch after {} pages: {}", dispatched, err);
                    stop_error = Some(err);
                    break;
                }
            };
            if page.is_empty() {
                break;
            }
            log::trace!("dispatching page {} ({} lines)", dispatched, page.len());
            let spawned = thread::Builder::new()
                .spawn_scoped(scope, move || page_fn(page).map_err(Into::<BoxError>::into));
            match spawned {
                Ok(task) => {
                    in_flight.push_back((dispatched, task));
                    dispatched += 1;
                }
                Err(err) => {
                    log::warn!("failed to spawn worker for page {}: {}", dispatched, err);
                    stop_error = Some(err);
                    break;
                }
            }
        }
        log::debug!(
            "dispatched {} pages of up to {} lines, {} at a time",
            dispatched,
            config.page_size,
            config.max_in_flight
        );

        for (index, task) in in_flight {
            fold.join(index, task);
        }
        match fold.failure.or_else(|| stop_error.map(AggregateError::from)) {
            Some(err) => Err(err),
            None => Ok(fold.result),
        }
    })
}

/// Running total plus the first page failure seen. Pages must be joined in
/// dispatch order.
struct Fold<A> {
    result: A,
    failure: Option<AggregateError>,
}

impl<A: Default> Default for Fold<A> {
    fn default() -> Self {
        Self {
            result: A::default(),
            failure: None,
        }
    }
}

impl<A: AddAssign> Fold<A> {
    fn join(&mut self, index: usize, task: ScopedJoinHandle<'_, Result<A, BoxError>>) {
        let outcome = match task.join() {
            Ok(Ok(partial)) => Ok(partial),
            Ok(Err(source)) => Err(AggregateError::Page { index, source }),
            Err(payload) => Err(AggregateError::PagePanicked {
                index,
                message: panic_message(payload.as_ref()),
            }),
        };
        match outcome {
            Ok(partial) if self.failure.is_none() => self.result += partial,
            Ok(_) => {}
            Err(err) => {
                log::warn!("{}", err);
                if self.failure.is_none() {
                    self.failure = Some(err);
                }
            }
        }
    }
}

/// Count `vocabulary` words in `reader` using [`DEFAULT_PAGE_SIZE`] pages.
///
/// Input must be UTF-8. A line that is not fails the read with
/// [`std::io::ErrorKind::InvalidData`], which stops dispatch and surfaces as
/// [`AggregateError::Io`] unless a page failed first.
pub fn explore_key_words<R>(
    vocabulary: &Vocabulary,
    reader: &mut R,
) -> Result<Stats, AggregateError>
where
    R: BufRead + ?Sized,
{
    explore_key_words_with(vocabulary, reader, AggregateConfig::default())
}

pub fn explore_key_words_with<R>(
    vocabulary: &Vocabulary,
    reader: &mut R,
    config: AggregateConfig,
) -> Result<Stats, AggregateError>
where
    R: BufRead + ?Sized,
{
    map_reduce(reader, config, |page| {
        Ok::<_, Infallible>(explore_lines(vocabulary, &page))
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        (*s).to_owned()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}

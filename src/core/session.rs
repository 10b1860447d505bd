use crate::core::cast::cast_line;
use crate::core::repository::HexagramRepository;
use crate::domain::model::{
    CastSequence, HexagramContext, InterpretationOutcome, LineValue, NewReading,
};
use crate::domain::ports::{HexagramDataset, Interpreter, ReadingStore};
use crate::utils::error::{DivinationError, Result};
use crate::utils::validation::validate_question;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Casting,
    LocalResultReady,
    InterpretationStreaming,
    InterpretationComplete,
}

/// One active divination flow: cast six lines, resolve the hexagram locally,
/// then optionally stream an interpretation from the remote master.
///
/// The session is the only mutable state in the system and is owned by a
/// single flow at a time; starting a new cast fully resets whatever came
/// before. No error path leaves a partially-cast sequence or a context that
/// disagrees with the cached cast.
pub struct ReadingSession<D: HexagramDataset, S: ReadingStore> {
    repository: HexagramRepository<D>,
    store: Option<Arc<S>>,
    line_delay: Duration,
    state: SessionState,
    question: String,
    throws: Vec<LineValue>,
    cast: Option<CastSequence>,
    local: Option<HexagramContext>,
    interpretation: Option<InterpretationOutcome>,
}

impl<D: HexagramDataset, S: ReadingStore> ReadingSession<D, S> {
    pub fn new(
        repository: HexagramRepository<D>,
        store: Option<Arc<S>>,
        line_delay: Duration,
    ) -> Self {
        Self {
            repository,
            store,
            line_delay,
            state: SessionState::Idle,
            question: String::new(),
            throws: Vec::new(),
            cast: None,
            local: None,
            interpretation: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    /// Lines revealed so far, in casting order. Grows one line at a time
    /// while casting; the UI renders the hexagram from this prefix.
    pub fn revealed_lines(&self) -> &[LineValue] {
        &self.throws
    }

    pub fn cast_sequence(&self) -> Option<&CastSequence> {
        self.cast.as_ref()
    }

    pub fn local_context(&self) -> Option<&HexagramContext> {
        self.local.as_ref()
    }

    pub fn interpretation(&self) -> Option<&InterpretationOutcome> {
        self.interpretation.as_ref()
    }

    /// Discards all session state and returns to Idle.
    pub fn reset(&mut self) {
        self.state = SessionState::Idle;
        self.question.clear();
        self.throws.clear();
        self.cast = None;
        self.local = None;
        self.interpretation = None;
    }

    /// Casts six lines sequentially, revealing each through `on_progress`
    /// (called with the full prefix so far), then resolves the hexagram
    /// against the reference dataset and persists the result best-effort.
    ///
    /// Any prior session state is discarded first.
    pub async fn cast<R: Rng>(
        &mut self,
        question: &str,
        rng: &mut R,
        mut on_progress: impl FnMut(&[LineValue]),
    ) -> Result<&HexagramContext> {
        self.reset();
        self.question = question.trim().to_string();
        self.state = SessionState::Casting;

        for _ in 0..6 {
            if !self.line_delay.is_zero() {
                tokio::time::sleep(self.line_delay).await;
            }
            self.throws.push(cast_line(rng));
            on_progress(&self.throws);
        }

        let mut lines = [LineValue::YoungYin; 6];
        lines.copy_from_slice(&self.throws);
        let cast = CastSequence::new(lines);

        let context = match self.repository.lookup_cast(&cast) {
            Ok(context) => context,
            Err(e) => {
                // Never leave a cast without its matching context.
                self.reset();
                return Err(e);
            }
        };

        if let Some(store) = &self.store {
            let reading = NewReading::from_context(&self.question, cast, &context);
            if let Err(e) = store.save(reading).await {
                // Persistence is best-effort and must not abort the flow.
                tracing::warn!("failed to persist reading locally: {e}");
            }
        }

        self.cast = Some(cast);
        self.state = SessionState::LocalResultReady;
        Ok(self.local.insert(context))
    }

    /// Submits the question and cast to the remote interpreter and streams
    /// the narrative back through `on_fragment`.
    ///
    /// `InsufficientFunds` leaves the session ready for a retry carrying an
    /// unlock token obtained from the reward flow; every other failure also
    /// restores `LocalResultReady` so the caller may retry as-is.
    pub async fn request_interpretation<I: Interpreter>(
        &mut self,
        interpreter: &I,
        unlock_token: Option<&str>,
        cancel: &CancellationToken,
        on_fragment: &mut (dyn for<'a> FnMut(&'a str) + Send),
    ) -> Result<&InterpretationOutcome> {
        if self.state != SessionState::LocalResultReady {
            return Err(DivinationError::InvalidState {
                message: format!("interpretation requires a local result, state is {:?}", self.state),
            });
        }
        validate_question(&self.question)?;

        let cast = self.cast.ok_or_else(|| DivinationError::InvalidState {
            message: "no cast sequence cached".to_string(),
        })?;

        self.state = SessionState::InterpretationStreaming;
        match interpreter
            .interpret_stream(&self.question, &cast, unlock_token, cancel, on_fragment)
            .await
        {
            Ok(outcome) => {
                self.state = SessionState::InterpretationComplete;
                Ok(self.interpretation.insert(outcome))
            }
            Err(e) => {
                self.state = SessionState::LocalResultReady;
                Err(e)
            }
        }
    }
}

//! Ordered conversation log with ticketed streaming turns.
//!
//! A streamed reply is addressed by a [`TurnTicket`] rather than "the last
//! message". Tickets carry the log generation, and [`Conversation::reset`] bumps
//! it, so fragments from an abandoned stream can never land in a new log.

use bodycode_types::Turn;

/// Handle to the assistant turn a stream is filling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TurnTicket {
    index: usize,
    generation: u64,
}

impl TurnTicket {
    /// Position of the assistant turn in the log.
    #[must_use]
    pub fn index(self) -> usize {
        self.index
    }

    /// The first exchange of a log is the analysis itself.
    #[must_use]
    pub fn is_initial_analysis(self) -> bool {
        self.index == 1
    }
}

/// The ticket no longer addresses an open turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("stale turn ticket")]
pub struct StaleTicket;

#[derive(Debug, Default)]
pub struct Conversation {
    turns: Vec<Turn>,
    generation: u64,
    open: Option<usize>,
}

impl Conversation {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    #[must_use]
    pub fn has_open_turn(&self) -> bool {
        self.open.is_some()
    }

    /// Append a user turn and an empty assistant placeholder.
    ///
    /// Returns `None` while another turn is still open.
    pub fn begin_turn(&mut self, user_text: impl Into<String>) -> Option<TurnTicket> {
        if self.open.is_some() {
            return None;
        }
        self.turns.push(Turn::user(user_text));
        self.turns.push(Turn::placeholder());
        let index = self.turns.len() - 1;
        self.open = Some(index);
        Some(TurnTicket {
            index,
            generation: self.generation,
        })
    }

    /// Reset, then open the first turn of the new log.
    pub fn start_over(&mut self, user_text: impl Into<String>) -> TurnTicket {
        self.reset();
        self.turns.push(Turn::user(user_text));
        self.turns.push(Turn::placeholder());
        self.open = Some(1);
        TurnTicket {
            index: 1,
            generation: self.generation,
        }
    }

    fn check(&self, ticket: TurnTicket) -> Result<(), StaleTicket> {
        if ticket.generation == self.generation && self.open == Some(ticket.index) {
            Ok(())
        } else {
            Err(StaleTicket)
        }
    }

    /// Replace the open turn's text with `text`.
    pub fn update(&mut self, ticket: TurnTicket, text: String) -> Result<(), StaleTicket> {
        self.check(ticket)?;
        self.turns[ticket.index].text = text;
        Ok(())
    }

    /// Freeze the open turn and return its final text.
    pub fn complete(&mut self, ticket: TurnTicket) -> Result<&str, StaleTicket> {
        self.check(ticket)?;
        self.open = None;
        Ok(&self.turns[ticket.index].text)
    }

    /// Remove the open turn and the user turn that started it.
    pub fn rollback(&mut self, ticket: TurnTicket) -> Result<(), StaleTicket> {
        self.check(ticket)?;
        self.open = None;
        self.turns.truncate(ticket.index - 1);
        Ok(())
    }

    /// Replace the open turn with a fixed message and close it.
    pub fn fail_with_message(
        &mut self,
        ticket: TurnTicket,
        message: impl Into<String>,
    ) -> Result<(), StaleTicket> {
        self.check(ticket)?;
        self.open = None;
        self.turns[ticket.index].text = message.into();
        Ok(())
    }

    /// Drop every turn and invalidate outstanding tickets.
    pub fn reset(&mut self) {
        self.turns.clear();
        self.open = None;
        self.generation = self.generation.wrapping_add(1);
    }

    /// Turns after the initial exchange.
    #[must_use]
    pub fn follow_ups(&self) -> &[Turn] {
        self.turns.get(2..).unwrap_or_default()
    }
}

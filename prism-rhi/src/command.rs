//! Recording state shared by every command list implementation.

use crate::error::{RhiError, RhiResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ListState {
    /// Freshly created or reset with its allocator.
    #[default]
    Initial,
    Recording,
    /// Recording ended, ready to be executed.
    Closed,
}

impl ListState {
    pub fn name(self) -> &'static str {
        match self {
            ListState::Initial => "initial",
            ListState::Recording => "recording",
            ListState::Closed => "closed",
        }
    }

    #[inline]
    pub fn ensure_recording(self) -> RhiResult<()> {
        self.ensure(ListState::Recording)
    }

    pub fn ensure(self, expected: ListState) -> RhiResult<()> {
        if self != expected {
            return Err(RhiError::InvalidCommandListState {
                expected: expected.name(),
                actual: self.name(),
            });
        }
        Ok(())
    }

    /// `begin_recording` is allowed from any state but recording.
    pub fn begin(&mut self) -> RhiResult<()> {
        if *self == ListState::Recording {
            return Err(RhiError::InvalidCommandListState {
                expected: "initial or closed",
                actual: self.name(),
            });
        }
        *self = ListState::Recording;
        Ok(())
    }

    pub fn end(&mut self) -> RhiResult<()> {
        self.ensure_recording()?;
        *self = ListState::Closed;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_transitions() {
        let mut state = ListState::default();
        assert!(state.ensure_recording().is_err());
        assert!(state.end().is_err());

        state.begin().unwrap();
        assert!(state.begin().is_err());
        state.ensure_recording().unwrap();

        state.end().unwrap();
        assert_eq!(state, ListState::Closed);
        match state.ensure_recording() {
            Err(RhiError::InvalidCommandListState { expected, actual }) => {
                assert_eq!(expected, "recording");
                assert_eq!(actual, "closed");
            }
            other => panic!("unexpected {other:?}"),
        }
        state.begin().unwrap();
    }
}

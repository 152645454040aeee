use crate::core::input::Lane;
use crate::game::judgment::Grade;

/// Scroll position of the judgement line. Notes spawn at 0 and travel towards it.
pub const JUDGEMENT_LINE: f32 = 85.0;
/// Notes past this position are purged whatever their status.
pub const OFF_TRACK: f32 = 110.0;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum NoteKind {
    Normal,
    Hold {
        /// Scroll distance still to be consumed while held.
        remaining: f32,
        /// Set once a lane press has latched onto this hold.
        engaged: bool,
        /// True while the lane is still down.
        held: bool,
    },
}

impl NoteKind {
    pub fn hold(length: f32) -> Self {
        NoteKind::Hold {
            remaining: length,
            engaged: false,
            held: false,
        }
    }

    #[inline(always)]
    pub fn is_hold(&self) -> bool {
        matches!(self, NoteKind::Hold { .. })
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum NoteStatus {
    Live,
    Resolved(Grade),
    Missed,
}

#[derive(Clone, Debug)]
pub struct Note {
    pub id: u64,
    pub lane: Lane,
    pub position: f32,
    pub kind: NoteKind,
    pub status: NoteStatus,
}

impl Note {
    pub fn new(id: u64, lane: Lane, kind: NoteKind) -> Self {
        Self {
            id,
            lane,
            position: 0.0,
            kind,
            status: NoteStatus::Live,
        }
    }

    #[inline(always)]
    pub fn is_live(&self) -> bool {
        self.status == NoteStatus::Live
    }

    #[inline(always)]
    pub fn is_resolved(&self) -> bool {
        matches!(self.status, NoteStatus::Resolved(_))
    }

    #[inline(always)]
    pub fn is_missed(&self) -> bool {
        self.status == NoteStatus::Missed
    }

    /// Absolute distance to the judgement line.
    #[inline(always)]
    pub fn distance(&self) -> f32 {
        (self.position - JUDGEMENT_LINE).abs()
    }

    /// True for a hold that a press has already latched onto.
    #[inline(always)]
    pub fn is_engaged(&self) -> bool {
        matches!(self.kind, NoteKind::Hold { engaged: true, .. })
    }

    /// Moves a live note into a terminal status. Returns false (and changes
    /// nothing) if the note already left `Live`.
    pub fn finish(&mut self, status: NoteStatus) -> bool {
        if !self.is_live() || status == NoteStatus::Live {
            return false;
        }
        self.status = status;
        true
    }
}

/// Read-only copy of a note handed to the presentation layer.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct NoteView {
    pub id: u64,
    pub lane: Lane,
    pub position: f32,
    pub hold_remaining: Option<f32>,
    pub held: bool,
    pub missed: bool,
}

impl From<&Note> for NoteView {
    fn from(note: &Note) -> Self {
        let (hold_remaining, held) = match note.kind {
            NoteKind::Normal => (None, false),
            NoteKind::Hold { remaining, held, .. } => (Some(remaining), held),
        };
        Self {
            id: note.id,
            lane: note.lane,
            position: note.position,
            hold_remaining,
            held,
            missed: note.is_missed(),
        }
    }
}

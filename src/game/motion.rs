use crate::core::input::Lane;
use crate::game::judgment::{BAD_WINDOW, Grade};
use crate::game::note::{JUDGEMENT_LINE, Note, NoteKind, NoteStatus, OFF_TRACK};

/// A live note past this position can no longer be hit and counts as missed.
pub const MISS_BOUNDARY: f32 = JUDGEMENT_LINE + BAD_WINDOW;

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum MotionEvent {
    /// A held note was consumed completely.
    HoldCompleted { id: u64, lane: Lane },
    /// The lane was released while the hold still had length left.
    HoldBroken { id: u64, lane: Lane, remaining: f32 },
    /// The note crossed the miss boundary untouched.
    Missed { id: u64, lane: Lane, position: f32 },
}

/// Moves every live note by `speed * dt_factor`, consumes held holds, flags
/// misses, then drops every note that is finished or off the track.
///
/// Counters are not touched here; the caller applies the returned events.
pub fn advance(notes: &mut Vec<Note>, speed: f32, dt_factor: f32) -> Vec<MotionEvent> {
    let step = speed * dt_factor;
    let mut events = Vec::new();

    for note in notes.iter_mut().filter(|n| n.is_live()) {
        match &mut note.kind {
            NoteKind::Normal => note.position += step,
            NoteKind::Hold {
                remaining,
                engaged,
                held,
            } => {
                if *held {
                    *remaining = (*remaining - step).max(0.0);
                    note.position = JUDGEMENT_LINE;
                    if *remaining <= 0.0 {
                        note.status = NoteStatus::Resolved(Grade::Perfect);
                        events.push(MotionEvent::HoldCompleted {
                            id: note.id,
                            lane: note.lane,
                        });
                    }
                } else if *engaged {
                    let remaining = *remaining;
                    note.status = NoteStatus::Missed;
                    events.push(MotionEvent::HoldBroken {
                        id: note.id,
                        lane: note.lane,
                        remaining,
                    });
                } else {
                    note.position += step;
                }
            }
        }

        if note.is_live() && note.position > MISS_BOUNDARY {
            note.status = NoteStatus::Missed;
            events.push(MotionEvent::Missed {
                id: note.id,
                lane: note.lane,
                position: note.position,
            });
        }
    }

    notes.retain(|n| n.is_live() && n.position <= OFF_TRACK);
    events
}

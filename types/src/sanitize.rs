//! Terminal sanitization for model output.
//!
//! Analysis text is printed straight to the user's terminal, so escape sequences
//! (OSC 52 clipboard writes, OSC 8 hyperlinks, CSI cursor movement) and raw
//! control characters are removed before the text enters the conversation log.

use std::borrow::Cow;

const ESC: char = '\x1b';
const BEL: char = '\x07';
const C1_CSI: char = '\u{009b}';

#[derive(Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    /// Saw ESC, waiting for the sequence introducer.
    Escape,
    /// CSI parameters until a final byte in `0x40..=0x7E`.
    Csi,
    /// OSC payload until BEL or ST.
    Osc,
    /// DCS/PM/APC payload until ST.
    Terminated,
    /// ESC seen inside an OSC/DCS payload; `\` completes ST.
    PayloadEscape { osc: bool },
    /// Fixed number of characters left to drop.
    Skip(u8),
}

/// Strip escape sequences and control characters, keeping `\n`, `\t` and `\r`.
///
/// Returns `Cow::Borrowed` for text that needs no changes.
#[must_use]
pub fn sanitize_terminal_text(input: &str) -> Cow<'_, str> {
    if !input.chars().any(is_unsafe) {
        return Cow::Borrowed(input);
    }

    let mut out = String::with_capacity(input.len());
    let mut state = State::Text;

    for c in input.chars() {
        state = match state {
            State::Text => match c {
                ESC => State::Escape,
                C1_CSI => State::Csi,
                c if is_unsafe(c) => State::Text,
                c => {
                    out.push(c);
                    State::Text
                }
            },
            State::Escape => match c {
                '[' => State::Csi,
                ']' => State::Osc,
                'P' | '^' | '_' => State::Terminated,
                '(' | ')' | '*' | '+' | '#' | ' ' => State::Skip(1),
                '7' | '8' | 'c' | 'D' | 'E' | 'H' | 'M' | 'N' | 'O' | 'Z' | '=' | '>' | '<' => {
                    State::Text
                }
                ESC => State::Escape,
                c => {
                    // Unknown introducer: drop the ESC, keep the character.
                    if !is_unsafe(c) {
                        out.push(c);
                    }
                    State::Text
                }
            },
            State::Csi => match c {
                '\x40'..='\x7e' => State::Text,
                '\x20'..='\x3f' => State::Csi,
                c => {
                    if !is_unsafe(c) {
                        out.push(c);
                    }
                    State::Text
                }
            },
            State::Osc => match c {
                BEL => State::Text,
                ESC => State::PayloadEscape { osc: true },
                _ => State::Osc,
            },
            State::Terminated => match c {
                ESC => State::PayloadEscape { osc: false },
                _ => State::Terminated,
            },
            State::PayloadEscape { osc } => match c {
                '\\' => State::Text,
                _ if osc => State::Osc,
                _ => State::Terminated,
            },
            State::Skip(n) => {
                if n > 1 {
                    State::Skip(n - 1)
                } else {
                    State::Text
                }
            }
        };
    }

    Cow::Owned(out)
}

fn is_unsafe(c: char) -> bool {
    match c {
        '\n' | '\t' | '\r' => false,
        '\x00'..='\x1f' | '\x7f' | '\u{0080}'..='\u{009f}' => true,
        _ => false,
    }
}

use crate::types::{Keycode, Modifier};
use std::collections::HashMap;

/// Output code space: HID keyboard usage ids for the base keys, with
/// one-shot chorded modifiers packed into bits 8..11 and a reserved range
/// above them for special operations the output layer interprets itself.
pub mod code {
    pub const A: u16 = 0x04;
    pub const B: u16 = 0x05;
    pub const C: u16 = 0x06;
    pub const D: u16 = 0x07;
    pub const E: u16 = 0x08;
    pub const F: u16 = 0x09;
    pub const G: u16 = 0x0A;
    pub const H: u16 = 0x0B;
    pub const I: u16 = 0x0C;
    pub const J: u16 = 0x0D;
    pub const K: u16 = 0x0E;
    pub const L: u16 = 0x0F;
    pub const M: u16 = 0x10;
    pub const N: u16 = 0x11;
    pub const O: u16 = 0x12;
    pub const P: u16 = 0x13;
    pub const Q: u16 = 0x14;
    pub const R: u16 = 0x15;
    pub const S: u16 = 0x16;
    pub const T: u16 = 0x17;
    pub const U: u16 = 0x18;
    pub const V: u16 = 0x19;
    pub const W: u16 = 0x1A;
    pub const X: u16 = 0x1B;
    pub const Y: u16 = 0x1C;
    pub const Z: u16 = 0x1D;

    pub const N1: u16 = 0x1E;
    pub const N2: u16 = 0x1F;
    pub const N3: u16 = 0x20;
    pub const N4: u16 = 0x21;
    pub const N5: u16 = 0x22;
    pub const N6: u16 = 0x23;
    pub const N7: u16 = 0x24;
    pub const N8: u16 = 0x25;
    pub const N9: u16 = 0x26;
    pub const N0: u16 = 0x27;

    pub const ENT: u16 = 0x28;
    pub const ESC: u16 = 0x29;
    pub const BSPC: u16 = 0x2A;
    pub const TAB: u16 = 0x2B;
    pub const SPC: u16 = 0x2C;
    pub const MINS: u16 = 0x2D;
    pub const EQL: u16 = 0x2E;
    pub const LBRC: u16 = 0x2F;
    pub const RBRC: u16 = 0x30;
    pub const BSLS: u16 = 0x31;
    pub const SCLN: u16 = 0x33;
    pub const QUOT: u16 = 0x34;
    pub const GRV: u16 = 0x35;
    pub const COMM: u16 = 0x36;
    pub const DOT: u16 = 0x37;
    pub const SLSH: u16 = 0x38;
    pub const CAPS: u16 = 0x39;

    pub const F1: u16 = 0x3A;
    pub const F2: u16 = 0x3B;
    pub const F3: u16 = 0x3C;
    pub const F4: u16 = 0x3D;
    pub const F5: u16 = 0x3E;
    pub const F6: u16 = 0x3F;
    pub const F7: u16 = 0x40;
    pub const F8: u16 = 0x41;
    pub const F9: u16 = 0x42;
    pub const F10: u16 = 0x43;
    pub const F11: u16 = 0x44;
    pub const F12: u16 = 0x45;
    pub const F13: u16 = 0x68;
    pub const F14: u16 = 0x69;
    pub const F15: u16 = 0x6A;
    pub const F16: u16 = 0x6B;
    pub const F17: u16 = 0x6C;
    pub const F18: u16 = 0x6D;
    pub const F19: u16 = 0x6E;
    pub const F20: u16 = 0x6F;

    pub const INS: u16 = 0x49;
    pub const HOME: u16 = 0x4A;
    pub const PGUP: u16 = 0x4B;
    pub const DEL: u16 = 0x4C;
    pub const END: u16 = 0x4D;
    pub const PGDN: u16 = 0x4E;
    pub const RGHT: u16 = 0x4F;
    pub const LEFT: u16 = 0x50;
    pub const DOWN: u16 = 0x51;
    pub const UP: u16 = 0x52;

    /// Special operations. The output layer interprets these; the core only
    /// routes them.
    pub const RESET: u16 = 0x5C00;
    pub const DEBUG: u16 = 0x5C01;
}

pub const CTL_BIT: u16 = 0x0100;
pub const SFT_BIT: u16 = 0x0200;
pub const ALT_BIT: u16 = 0x0400;
pub const GUI_BIT: u16 = 0x0800;

/// Chorded one-shot modifier wrappers: `s(code::N1)` is `!` on a US host.
pub const fn ctl(code: u16) -> u16 {
    code | CTL_BIT
}

pub const fn s(code: u16) -> u16 {
    code | SFT_BIT
}

pub const fn alt(code: u16) -> u16 {
    code | ALT_BIT
}

pub const fn gui(code: u16) -> u16 {
    code | GUI_BIT
}

lazy_static::lazy_static! {
    static ref BY_NAME: HashMap<&'static str, Keycode> = {
        use crate::types::Keycode::{Modifier as Mod, Plain};
        let mut m = HashMap::new();

        let letters: [(&str, u16); 26] = [
            ("a", code::A), ("b", code::B), ("c", code::C), ("d", code::D),
            ("e", code::E), ("f", code::F), ("g", code::G), ("h", code::H),
            ("i", code::I), ("j", code::J), ("k", code::K), ("l", code::L),
            ("m", code::M), ("n", code::N), ("o", code::O), ("p", code::P),
            ("q", code::Q), ("r", code::R), ("s", code::S), ("t", code::T),
            ("u", code::U), ("v", code::V), ("w", code::W), ("x", code::X),
            ("y", code::Y), ("z", code::Z),
        ];
        for (name, c) in letters {
            m.insert(name, Plain(c));
        }

        let digits: [(&str, u16); 10] = [
            ("1", code::N1), ("2", code::N2), ("3", code::N3), ("4", code::N4),
            ("5", code::N5), ("6", code::N6), ("7", code::N7), ("8", code::N8),
            ("9", code::N9), ("0", code::N0),
        ];
        for (name, c) in digits {
            m.insert(name, Plain(c));
        }

        let named: [(&str, u16); 38] = [
            ("ent", code::ENT), ("esc", code::ESC), ("bspc", code::BSPC),
            ("tab", code::TAB), ("spc", code::SPC), ("mins", code::MINS),
            ("eql", code::EQL), ("lbrc", code::LBRC), ("rbrc", code::RBRC),
            ("bsls", code::BSLS), ("scln", code::SCLN), ("quot", code::QUOT),
            ("grv", code::GRV), ("comm", code::COMM), ("dot", code::DOT),
            ("slsh", code::SLSH), ("caps", code::CAPS),
            ("f1", code::F1), ("f2", code::F2), ("f3", code::F3),
            ("f4", code::F4), ("f5", code::F5), ("f6", code::F6),
            ("f7", code::F7), ("f8", code::F8), ("f9", code::F9),
            ("f10", code::F10), ("f11", code::F11), ("f12", code::F12),
            ("ins", code::INS), ("home", code::HOME), ("pgup", code::PGUP),
            ("del", code::DEL), ("end", code::END), ("pgdn", code::PGDN),
            ("rght", code::RGHT), ("down", code::DOWN), ("up", code::UP),
        ];
        for (name, c) in named {
            m.insert(name, Plain(c));
        }
        m.insert("left", Plain(code::LEFT));
        m.insert("f13", Plain(code::F13));
        m.insert("f14", Plain(code::F14));
        m.insert("f15", Plain(code::F15));
        m.insert("f16", Plain(code::F16));
        m.insert("f17", Plain(code::F17));
        m.insert("f18", Plain(code::F18));
        m.insert("f19", Plain(code::F19));
        m.insert("f20", Plain(code::F20));

        m.insert("lctl", Mod(Modifier::LCtrl));
        m.insert("lsft", Mod(Modifier::LShift));
        m.insert("lalt", Mod(Modifier::LAlt));
        m.insert("lgui", Mod(Modifier::LGui));
        m.insert("rctl", Mod(Modifier::RCtrl));
        m.insert("rsft", Mod(Modifier::RShift));
        m.insert("ralt", Mod(Modifier::RAlt));
        m.insert("rgui", Mod(Modifier::RGui));

        // Space-cadet shift pair: shift when held, paren when tapped.
        m.insert("lspo", Keycode::ModTap { modifier: Modifier::LShift, tap: s(code::N9) });
        m.insert("rspc", Keycode::ModTap { modifier: Modifier::RShift, tap: s(code::N0) });

        m.insert("reset", Plain(code::RESET));
        m.insert("debug", Plain(code::DEBUG));

        m
    };
}

/// Looks up a bare key name (case-insensitive). Wrapped forms like
/// `mo(...)` are the parser's business, not this table's.
pub fn keycode_for(name: &str) -> Option<Keycode> {
    BY_NAME.get(name.to_ascii_lowercase().as_str()).copied()
}

/// Looks up a name that must denote a plain output code, resolving modifier
/// names to their output codes so they can be used as tap codes.
pub fn plain_code_for(name: &str) -> Option<u16> {
    match keycode_for(name)? {
        Keycode::Plain(c) => Some(c),
        Keycode::Modifier(m) => Some(m.code()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert_eq!(keycode_for("Q"), Some(Keycode::Plain(code::Q)));
        assert_eq!(keycode_for("q"), Some(Keycode::Plain(code::Q)));
        assert_eq!(keycode_for("SCLN"), Some(Keycode::Plain(code::SCLN)));
    }

    #[test]
    fn test_modifier_names() {
        assert_eq!(keycode_for("lsft"), Some(Keycode::Modifier(Modifier::LShift)));
        assert_eq!(plain_code_for("lsft"), Some(0xE1));
    }

    #[test]
    fn test_chord_bits_compose() {
        assert_eq!(s(alt(code::MINS)), code::MINS | SFT_BIT | ALT_BIT);
        // Special range stays above anything a chorded base code can reach.
        assert!(code::RESET > gui(alt(s(ctl(0xFF)))));
    }

    #[test]
    fn test_space_cadet_pair() {
        assert_eq!(
            keycode_for("lspo"),
            Some(Keycode::ModTap { modifier: Modifier::LShift, tap: s(code::N9) })
        );
    }
}

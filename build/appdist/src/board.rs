// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::fmt;
use std::str::FromStr;

use crate::error::{closest, DiscoveryError};

/// Target boards with their own application set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Board {
    Qemu,
    K210,
}

impl Board {
    pub const ALL: [Board; 2] = [Board::Qemu, Board::K210];

    pub fn as_str(&self) -> &'static str {
        match *self {
            Board::Qemu => "qemu",
            Board::K210 => "k210",
        }
    }

    pub(crate) fn names() -> String {
        Self::ALL
            .iter()
            .map(|b| format!("'{}'", b.as_str()))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Resolves the board for a run. An explicit `flag` value wins over the
    /// environment; an unset or empty selector means no board.
    pub fn select(
        flag: Option<&str>,
        env_var: &str,
    ) -> Result<Option<Board>, DiscoveryError> {
        if let Some(value) = flag {
            return Self::parse_selector(Some(value));
        }
        match std::env::var_os(env_var) {
            Some(value) => {
                Self::parse_selector(Some(&*value.to_string_lossy()))
            }
            None => Ok(None),
        }
    }

    pub fn parse_selector(
        value: Option<&str>,
    ) -> Result<Option<Board>, DiscoveryError> {
        match value {
            None | Some("") => Ok(None),
            Some(v) => v.parse().map(Some),
        }
    }
}

impl FromStr for Board {
    type Err = DiscoveryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|b| b.as_str() == s)
            .ok_or_else(|| DiscoveryError::UnknownBoard {
                value: s.to_string(),
                suggestion: closest(s, Self::ALL.iter().map(|b| b.as_str())),
            })
    }
}

impl fmt::Display for Board {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_boards_parse() {
        assert_eq!("qemu".parse::<Board>().unwrap(), Board::Qemu);
        assert_eq!("k210".parse::<Board>().unwrap(), Board::K210);
    }

    #[test]
    fn empty_selector_is_no_board() {
        assert_eq!(Board::parse_selector(None).unwrap(), None);
        assert_eq!(Board::parse_selector(Some("")).unwrap(), None);
    }

    #[test]
    fn unknown_board_is_rejected_with_suggestion() {
        let err = Board::parse_selector(Some("QEMU")).unwrap_err();
        match &err {
            DiscoveryError::UnknownBoard { value, suggestion } => {
                assert_eq!(value, "QEMU");
                assert_eq!(suggestion.as_deref(), None);
            }
            other => panic!("unexpected error {:?}", other),
        }

        let err = Board::parse_selector(Some("k201")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "'k201' is not a valid board; expected one of 'qemu', 'k210'. \
             Did you mean 'k210'?"
        );
    }

    #[test]
    fn flag_overrides_environment() {
        // The variable name is unique to this test, so nothing else races
        // with it.
        std::env::set_var("APPDIST_TEST_BOARD_FLAG", "k210");
        let board = Board::select(Some("qemu"), "APPDIST_TEST_BOARD_FLAG");
        assert_eq!(board.unwrap(), Some(Board::Qemu));
        let board = Board::select(None, "APPDIST_TEST_BOARD_FLAG");
        assert_eq!(board.unwrap(), Some(Board::K210));
        std::env::remove_var("APPDIST_TEST_BOARD_FLAG");
    }
}

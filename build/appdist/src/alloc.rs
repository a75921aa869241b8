// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Load address assignment.
//!
//! Every application gets a fixed-size slot of the address space, `stride`
//! bytes wide, starting at `base`. Slot `i` belongs to the application with
//! ordinal `i`, so the assignment depends only on the ordering chosen at
//! discovery time.

use std::fmt;
use std::io::{self, Write};
use std::ops::RangeInclusive;

use crate::discover::Application;
use crate::error::AllocationError;

/// Address a program is linked to run at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LoadAddress(u64);

impl LoadAddress {
    pub fn value(self) -> u64 {
        self.0
    }

    /// Formats the address so that it can stand in for `token` in a linker
    /// script: a hex literal token keeps its prefix, digit case and minimum
    /// width. Anything else gets plain `0x...`.
    pub fn render_like(self, token: &str) -> String {
        let hex = token
            .strip_prefix("0x")
            .map(|d| ("0x", d))
            .or_else(|| token.strip_prefix("0X").map(|d| ("0X", d)))
            .filter(|(_, d)| {
                !d.is_empty() && d.chars().all(|c| c.is_ascii_hexdigit())
            });

        match hex {
            Some((prefix, digits)) => {
                let width = digits.len();
                if digits.chars().any(|c| c.is_ascii_uppercase()) {
                    format!("{}{:0width$X}", prefix, self.0, width = width)
                } else {
                    format!("{}{:0width$x}", prefix, self.0, width = width)
                }
            }
            None => format!("{:#x}", self.0),
        }
    }
}

impl fmt::Display for LoadAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// Where application slots live in the target's address space.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub base: u64,
    pub stride: u64,
    /// Smallest slot that can hold a linked program at all.
    pub min_section_size: u64,
    /// Width of the target's address space, 1..=64.
    pub address_bits: u32,
}

impl Layout {
    pub fn check_stride(&self) -> Result<(), AllocationError> {
        if self.stride == 0 || self.stride < self.min_section_size {
            return Err(AllocationError::StrideTooSmall {
                stride: self.stride,
                min: self.min_section_size,
            });
        }
        Ok(())
    }

    pub fn max_address(&self) -> u64 {
        if self.address_bits >= 64 {
            u64::MAX
        } else {
            (1u64 << self.address_bits) - 1
        }
    }

    /// Bytes reserved for the slot starting at `address`.
    pub fn slot(&self, address: LoadAddress) -> RangeInclusive<u64> {
        // allocate() guarantees this doesn't overflow
        address.0..=address.0 + (self.stride - 1)
    }
}

/// Computes the load address of the application at `ordinal`.
pub fn allocate(
    ordinal: usize,
    layout: &Layout,
) -> Result<LoadAddress, AllocationError> {
    layout.check_stride()?;

    let overflow = || AllocationError::Overflow {
        ordinal,
        base: layout.base,
        stride: layout.stride,
        bits: layout.address_bits,
    };

    let offset = u64::try_from(ordinal)
        .ok()
        .and_then(|i| i.checked_mul(layout.stride))
        .ok_or_else(overflow)?;
    let start = layout.base.checked_add(offset).ok_or_else(overflow)?;
    let last = start.checked_add(layout.stride - 1).ok_or_else(overflow)?;
    if last > layout.max_address() {
        return Err(overflow());
    }

    Ok(LoadAddress(start))
}

/// Every application of a run paired with its load address, in build order.
#[derive(Clone, Debug)]
pub struct Plan {
    layout: Layout,
    entries: Vec<(Application, LoadAddress)>,
}

impl Plan {
    /// Allocates addresses for `apps`, which must already carry dense
    /// ordinals. Fails without allocating anything if the layout itself is
    /// unusable.
    pub fn new(
        apps: Vec<Application>,
        layout: Layout,
    ) -> Result<Self, AllocationError> {
        layout.check_stride()?;
        let entries = apps
            .into_iter()
            .map(|app| {
                let address = allocate(app.ordinal, &layout)?;
                Ok((app, address))
            })
            .collect::<Result<Vec<_>, AllocationError>>()?;
        Ok(Plan { layout, entries })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &(Application, LoadAddress)> {
        self.entries.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(app, _)| app.name.as_str())
    }

    pub fn address_of(&self, name: &str) -> Option<LoadAddress> {
        self.entries
            .iter()
            .find(|(app, _)| app.name == name)
            .map(|(_, address)| *address)
    }

    /// Writes a human-readable allocation map, one slot per line.
    pub fn write_map(&self, out: &mut impl Write) -> io::Result<()> {
        writeln!(out, "ORD ADDRESS            LAST               NAME")?;
        for (app, address) in &self.entries {
            let slot = self.layout.slot(*address);
            writeln!(
                out,
                "{:>3} {:#018x} {:#018x} {}",
                app.ordinal,
                slot.start(),
                slot.end(),
                app.name
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn layout(base: u64, stride: u64) -> Layout {
        Layout {
            base,
            stride,
            min_section_size: 0x1000,
            address_bits: 64,
        }
    }

    fn apps(names: &[&str]) -> Vec<Application> {
        names
            .iter()
            .enumerate()
            .map(|(ordinal, name)| Application {
                name: name.to_string(),
                source_path: format!("src/bin/{}.rs", name).into(),
                ordinal,
            })
            .collect()
    }

    #[test]
    fn addresses_step_by_stride() {
        let l = layout(0x8350_0000, 0x2_0000);
        assert_eq!(allocate(0, &l).unwrap().value(), 0x8350_0000);
        assert_eq!(allocate(1, &l).unwrap().value(), 0x8352_0000);
        assert_eq!(allocate(7, &l).unwrap().value(), 0x835e_0000);
    }

    #[test]
    fn stride_below_minimum_is_rejected() {
        let mut l = layout(0x8350_0000, 0x800);
        assert!(matches!(
            allocate(0, &l),
            Err(AllocationError::StrideTooSmall {
                stride: 0x800,
                min: 0x1000
            })
        ));

        l.stride = 0;
        l.min_section_size = 0;
        assert!(matches!(
            allocate(0, &l),
            Err(AllocationError::StrideTooSmall { .. })
        ));
    }

    #[test]
    fn overflow_of_address_space_is_rejected() {
        let l = Layout {
            address_bits: 32,
            ..layout(0xfff0_0000, 0x2_0000)
        };
        // Slots 0..=7 fit below 4 GiB; slot 8 would end past it.
        assert!(allocate(7, &l).is_ok());
        assert!(matches!(
            allocate(8, &l),
            Err(AllocationError::Overflow { ordinal: 8, bits: 32, .. })
        ));

        let l = layout(u64::MAX - 0xffff, 0x1_0000);
        assert!(allocate(0, &l).is_ok());
        assert!(allocate(1, &l).is_err());
        assert!(allocate(usize::MAX, &l).is_err());
    }

    #[test]
    fn render_matches_token_style() {
        let a = LoadAddress(0x8352_0000);
        assert_eq!(a.render_like("0x83500000"), "0x83520000");
        assert_eq!(a.render_like("0X8350ABCD"), "0X83520000");
        assert_eq!(a.render_like("0x0000000083500000"), "0x0000000083520000");
        assert_eq!(a.render_like("@BASE_ADDRESS@"), "0x83520000");
        assert_eq!(LoadAddress(0x10).render_like("0x0000"), "0x0010");
    }

    #[test]
    fn plan_assigns_in_ordinal_order() {
        let plan =
            Plan::new(apps(&["fs", "init"]), layout(0x8350_0000, 0x2_0000))
                .unwrap();
        let got: Vec<_> = plan
            .iter()
            .map(|(app, address)| (app.name.as_str(), address.value()))
            .collect();
        assert_eq!(got, vec![("fs", 0x8350_0000), ("init", 0x8352_0000)]);
        assert_eq!(plan.address_of("init").unwrap().value(), 0x8352_0000);
        assert_eq!(plan.address_of("shell"), None);
    }

    #[test]
    fn empty_plan_still_checks_stride() {
        assert!(Plan::new(vec![], layout(0, 0x10)).is_err());
        assert!(Plan::new(vec![], layout(0, 0x1000)).unwrap().is_empty());
    }

    #[test]
    fn map_lists_every_slot() {
        let plan =
            Plan::new(apps(&["fs", "init"]), layout(0x8350_0000, 0x2_0000))
                .unwrap();
        let mut out = vec![];
        plan.write_map(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[1],
            "  0 0x0000000083500000 0x000000008351ffff fs"
        );
        assert_eq!(
            lines[2],
            "  1 0x0000000083520000 0x000000008353ffff init"
        );
    }
}

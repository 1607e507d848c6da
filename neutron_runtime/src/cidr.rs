// Neutron Probe: API and Scenario Tests for OpenStack Networking
// Copyright (C) 2021  Tibor Schneider
//
// This program is free software; you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation; either version 2 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along
// with this program; if not, write to the Free Software Foundation, Inc.,
// 51 Franklin Street, Fifth Floor, Boston, MA 02110-1301 USA.

//! # Address ranges
//!
//! Minimal CIDR arithmetic, used to carve project subnets out of the configured address pools.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use thiserror::Error;

/// Error while parsing or splitting an address range
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CidrError {
    /// The string is not of the shape `address/prefix`
    #[error("Invalid CIDR: {0}")]
    Invalid(String),
    /// The prefix is longer than the address
    #[error("Prefix /{prefix} is too long for an IPv{version} address")]
    PrefixTooLong {
        /// The requested prefix
        prefix: u8,
        /// IP version of the address
        version: u8,
    },
    /// Subnets must be smaller than the range they are taken from
    #[error("Cannot split {range} into /{prefix} subnets")]
    InvalidSplit {
        /// The range
        range: String,
        /// The requested prefix
        prefix: u8,
    },
}

/// Address range, like `10.100.0.0/16`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Cidr {
    addr: IpAddr,
    prefix: u8,
}

impl Cidr {
    /// Create a new range
    pub fn new(addr: IpAddr, prefix: u8) -> Result<Self, CidrError> {
        let cidr = Self { addr, prefix };
        if prefix > cidr.max_prefix() {
            return Err(CidrError::PrefixTooLong { prefix, version: cidr.ip_version() });
        }
        Ok(cidr)
    }

    /// Parse a range of the shape `X.X.X.X/X` or `X:X::X/X`
    ///
    /// ```
    /// # use neutron_runtime::cidr::Cidr;
    /// let cidr = Cidr::try_from_str("10.100.22.5/17").unwrap();
    /// assert_eq!(cidr.prefix(), 17);
    /// assert_eq!(cidr.network().to_string(), "10.100.0.0/17");
    /// ```
    pub fn try_from_str(s: impl AsRef<str>) -> Result<Self, CidrError> {
        let s = s.as_ref().trim();
        let error = || CidrError::Invalid(s.to_string());
        let mut parts = s.split('/');
        let addr: IpAddr = parts.next().ok_or_else(error)?.parse().map_err(|_| error())?;
        let prefix: u8 = parts.next().ok_or_else(error)?.parse().map_err(|_| error())?;
        if parts.next().is_some() {
            return Err(error());
        }
        Self::new(addr, prefix)
    }

    /// Length of the prefix
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// The address, as given when creating the range
    pub fn addr(&self) -> IpAddr {
        self.addr
    }

    /// 4 or 6
    pub fn ip_version(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 4,
            IpAddr::V6(_) => 6,
        }
    }

    fn max_prefix(&self) -> u8 {
        match self.addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        }
    }

    fn bits(&self) -> u128 {
        match self.addr {
            IpAddr::V4(a) => u32::from(a) as u128,
            IpAddr::V6(a) => u128::from(a),
        }
    }

    fn with_bits(&self, bits: u128, prefix: u8) -> Self {
        let addr = match self.addr {
            IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::from(bits as u32)),
            IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::from(bits)),
        };
        Self { addr, prefix }
    }

    fn mask(&self, prefix: u8) -> u128 {
        let host_bits = (self.max_prefix() - prefix) as u32;
        let full = match self.addr {
            IpAddr::V4(_) => u32::MAX as u128,
            IpAddr::V6(_) => u128::MAX,
        };
        full.checked_shl(host_bits).unwrap_or(0) & full
    }

    /// The range with all host bits cleared
    pub fn network(&self) -> Self {
        self.with_bits(self.bits() & self.mask(self.prefix), self.prefix)
    }

    /// The `n`-th address inside the range, counting from the network address.
    pub fn host(&self, n: u128) -> Option<IpAddr> {
        let size = 1u128.checked_shl((self.max_prefix() - self.prefix) as u32);
        if size.map(|s| n >= s).unwrap_or(false) {
            return None;
        }
        Some(self.network().with_bits(self.network().bits() + n, self.prefix).addr)
    }

    /// Iterate over all subnets with the given prefix, in ascending order.
    ///
    /// ```
    /// # use neutron_runtime::cidr::Cidr;
    /// let pool = Cidr::try_from_str("10.100.0.0/16").unwrap();
    /// let mut subnets = pool.subnets(28).unwrap();
    /// assert_eq!(subnets.next().unwrap().to_string(), "10.100.0.0/28");
    /// assert_eq!(subnets.next().unwrap().to_string(), "10.100.0.16/28");
    /// ```
    pub fn subnets(&self, prefix: u8) -> Result<Subnets, CidrError> {
        if prefix < self.prefix || prefix > self.max_prefix() {
            return Err(CidrError::InvalidSplit { range: self.to_string(), prefix });
        }
        let count = 1u128.checked_shl((prefix - self.prefix) as u32).unwrap_or(u128::MAX);
        let step = 1u128.checked_shl((self.max_prefix() - prefix) as u32).unwrap_or(0);
        let base = self.network().with_bits(self.network().bits(), prefix);
        Ok(Subnets { base, step, count, next: 0 })
    }
}

impl fmt::Display for Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.addr, self.prefix)
    }
}

/// Iterator over the subnets of a range, see [`Cidr::subnets`].
#[derive(Debug, Clone)]
pub struct Subnets {
    base: Cidr,
    step: u128,
    count: u128,
    next: u128,
}

impl Iterator for Subnets {
    type Item = Cidr;

    fn next(&mut self) -> Option<Cidr> {
        if self.next >= self.count {
            return None;
        }
        let bits = self.base.bits() + self.next * self.step;
        self.next += 1;
        Some(self.base.with_bits(bits, self.base.prefix))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse() {
        assert!(Cidr::try_from_str("10.0.0.0").is_err());
        assert!(Cidr::try_from_str("10.0.0/8").is_err());
        assert!(Cidr::try_from_str("10.0.0.0/8/1").is_err());
        assert_eq!(
            Cidr::try_from_str("10.0.0.0/33"),
            Err(CidrError::PrefixTooLong { prefix: 33, version: 4 })
        );
        let v6 = Cidr::try_from_str("2001:db8::/48").unwrap();
        assert_eq!(v6.ip_version(), 6);
        assert_eq!(v6.to_string(), "2001:db8::/48");
    }

    #[test]
    fn network() {
        let cidr = Cidr::try_from_str("10.100.22.5/16").unwrap();
        assert_eq!(cidr.network(), Cidr::try_from_str("10.100.0.0/16").unwrap());
        let cidr = Cidr::try_from_str("0.0.0.0/0").unwrap();
        assert_eq!(cidr.network().to_string(), "0.0.0.0/0");
    }

    #[test]
    fn split() {
        let pool = Cidr::try_from_str("10.100.0.0/24").unwrap();
        let subnets: Vec<String> = pool.subnets(26).unwrap().map(|c| c.to_string()).collect();
        assert_eq!(
            subnets,
            vec!["10.100.0.0/26", "10.100.0.64/26", "10.100.0.128/26", "10.100.0.192/26"]
        );
        assert!(pool.subnets(23).is_err());
        assert!(pool.subnets(33).is_err());

        let v6 = Cidr::try_from_str("2001:db8::/48").unwrap();
        let mut subnets = v6.subnets(64).unwrap();
        assert_eq!(subnets.next().unwrap().to_string(), "2001:db8::/64");
        assert_eq!(subnets.next().unwrap().to_string(), "2001:db8:0:1::/64");
    }

    #[test]
    fn hosts() {
        let cidr = Cidr::try_from_str("10.10.0.0/24").unwrap();
        assert_eq!(cidr.host(1), Some("10.10.0.1".parse().unwrap()));
        assert_eq!(cidr.host(256), None);
    }
}

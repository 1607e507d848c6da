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

//! Assertion macros for test bodies. They return early with [`crate::Error::Assertion`], such that
//! a failed check ends the test body and the registry still runs its cleanups.

/// Fail the test unless the condition holds.
///
/// ```
/// # use neutron_runtime::{ensure, Result};
/// fn check(shared: bool) -> Result<()> {
///     ensure!(shared, "policy is not shared");
///     Ok(())
/// }
/// assert!(check(true).is_ok());
/// assert!(check(false).is_err());
/// ```
#[macro_export]
macro_rules! ensure {
    ($cond:expr $(,)?) => {
        if !$cond {
            return Err($crate::Error::Assertion(format!(
                "condition `{}` does not hold",
                stringify!($cond)
            )));
        }
    };
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::Error::Assertion(format!($($arg)+)));
        }
    };
}

/// Fail the test unless both expressions are equal.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr $(,)?) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    return Err($crate::Error::Assertion(format!(
                        "`{}` != `{}`: {:?} != {:?}",
                        stringify!($left),
                        stringify!($right),
                        left,
                        right
                    )));
                }
            }
        }
    };
    ($left:expr, $right:expr, $($arg:tt)+) => {
        match (&$left, &$right) {
            (left, right) => {
                if !(*left == *right) {
                    return Err($crate::Error::Assertion(format!(
                        "{}: {:?} != {:?}",
                        format_args!($($arg)+),
                        left,
                        right
                    )));
                }
            }
        }
    };
}

/// Fail the test unless the expression returns an error matching the classification method,
/// like `is_not_found` or `is_conflict`. Evaluates to the error.
///
/// ```
/// # use neutron_runtime::{expect_err, Error, Result};
/// fn check(r: Result<()>) -> Result<Error> {
///     Ok(expect_err!(r, is_timeout))
/// }
/// let timeout = Error::Timeout {
///     what: "nothing".to_string(),
///     elapsed: std::time::Duration::from_secs(1),
///     attempts: 1,
/// };
/// assert!(check(Err(timeout)).is_ok());
/// assert!(check(Ok(())).is_err());
/// ```
#[macro_export]
macro_rules! expect_err {
    ($result:expr, $check:ident) => {
        match $result {
            Ok(_) => {
                return Err($crate::Error::Assertion(format!(
                    "`{}` succeeded, expected {}",
                    stringify!($result),
                    stringify!($check)
                )))
            }
            Err(e) => {
                let e: $crate::Error = ::std::convert::From::from(e);
                if !e.$check() {
                    return Err($crate::Error::Assertion(format!(
                        "`{}` failed with an unexpected error: {}",
                        stringify!($result),
                        e
                    )));
                }
                e
            }
        }
    };
}

#[cfg(test)]
mod test {
    use crate::{Error, Result};

    fn positive(x: i32) -> Result<()> {
        ensure!(x > 0);
        ensure!(x < 100, "{} is too large", x);
        Ok(())
    }

    fn equal(a: &str, b: &str) -> Result<()> {
        ensure_eq!(a, b);
        ensure_eq!(a.len(), b.len(), "length of {}", a);
        Ok(())
    }

    fn conflict(r: std::result::Result<(), neutron_client::Error>) -> Result<()> {
        expect_err!(r, is_conflict);
        Ok(())
    }

    fn message(r: Result<()>) -> String {
        match r {
            Err(Error::Assertion(msg)) => msg,
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn ensure() {
        assert!(positive(5).is_ok());
        assert_eq!(message(positive(-1)), "condition `x > 0` does not hold");
        assert_eq!(message(positive(100)), "100 is too large");
    }

    #[test]
    fn ensure_eq() {
        assert!(equal("a", "a").is_ok());
        assert_eq!(message(equal("a", "b")), "`a` != `b`: \"a\" != \"b\"");
    }

    #[test]
    fn expect_err() {
        let in_use = neutron_client::Error::Conflict("in use".to_string());
        assert!(conflict(Err(in_use)).is_ok());
        assert!(message(conflict(Ok(()))).contains("succeeded, expected is_conflict"));
        let gone = neutron_client::Error::NotFound("gone".to_string());
        assert!(message(conflict(Err(gone))).contains("unexpected error"));
    }
}

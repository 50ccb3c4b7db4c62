//! Internal testing utilities for the struct-info crates.

use std::fmt::Debug;
use std::panic::{RefUnwindSafe, UnwindSafe};

/// Run a test function over a table of cases.
///
/// Inference rules are mostly exercised with tables of (inputs, expected
/// output) pairs. To write such a test:
///
/// 1. Import the `TestCases` trait
/// 2. Define a `Case` struct holding the inputs and expectation for one
///    case. It must implement `Debug`.
/// 3. Build an array or `Vec` of cases, conventionally named `cases`.
/// 4. Call `cases.test_each` with a closure that checks a single case.
///
/// Every case is run, even if an earlier one fails. Panics from individual
/// cases are caught and, once all cases have run, reported together along
/// with the debug representation of each failing case.
///
/// ```
/// use struct_info_testing::TestCases;
///
/// fn test_broadcast_len() {
///   #[derive(Debug)]
///   struct Case {
///     lhs: usize,
///     rhs: usize,
///     expected: usize,
///   }
///
///   let cases = [
///     Case { lhs: 2, rhs: 3, expected: 3 },
///     Case { lhs: 4, rhs: 1, expected: 4 },
///   ];
///
///   cases.test_each(|&Case { lhs, rhs, expected }| {
///     assert_eq!(lhs.max(rhs), expected);
///   });
/// }
/// # test_broadcast_len();
/// ```
///
/// Cases are passed to the test function by reference, so the case can still
/// be reported after a panic. Use [`test_each_clone`](TestCases::test_each_clone)
/// if the test needs an owned case.
///
/// Cases and any values captured by the test function must be
/// [unwind safe](std::panic::UnwindSafe). Values with interior mutability
/// should be created inside the test function, or wrapped in
/// [`AssertUnwindSafe`](std::panic::AssertUnwindSafe).
pub trait TestCases {
    /// The data for a single test case.
    type Case;

    /// Call `test` with a reference to each case, catching panics.
    ///
    /// Panics after all cases have run if any of them failed.
    fn test_each(self, test: impl Fn(&Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe;

    /// Call `test` with a clone of each case, catching panics.
    fn test_each_clone(self, test: impl Fn(Self::Case) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe;
}

/// Panic with a summary of failed cases, if there are any.
fn report_failures<T: Debug>(failures: &[T]) {
    assert!(
        failures.is_empty(),
        "{} test cases failed: {:#?}",
        failures.len(),
        failures
    );
}

impl<I: IntoIterator> TestCases for I {
    type Case = I::Item;

    fn test_each(self, test: impl Fn(&I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + RefUnwindSafe,
    {
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| std::panic::catch_unwind(|| test(case)).is_err())
            .collect();
        report_failures(&failures);
    }

    fn test_each_clone(self, test: impl Fn(I::Item) + RefUnwindSafe)
    where
        Self::Case: Debug + Clone + UnwindSafe,
    {
        let test = &test;
        let failures: Vec<_> = self
            .into_iter()
            .filter(|case| {
                let value = case.clone();
                std::panic::catch_unwind(move || test(value)).is_err()
            })
            .collect();
        report_failures(&failures);
    }
}

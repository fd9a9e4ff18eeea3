//! Building blocks shared by the voicecall and SMS filter chains.
//!
//! A filter chain walks every submitted request through a registry of
//! filters in priority order. Filters decide synchronously or suspend the
//! request and resume it later through the owning chain.

use core::cell::RefCell;
use core::num::NonZeroU32;

use embassy_sync::blocking_mutex::raw::NoopRawMutex;
use embassy_sync::blocking_mutex::Mutex;
use heapless::Vec;

use crate::error::Error;

/// Identifies one in-flight request of a chain. Opaque to filters; they only
/// hand it back when resuming a suspended request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RequestToken(pub(crate) NonZeroU32);

/// Identifier a filter assigns to its own pending operation so the chain can
/// cancel it. Meaningful only to the filter that returned it.
pub type PendingId = NonZeroU32;

/// What a filter handler did with a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterAction<D> {
    /// Decided synchronously.
    Ready(D),
    /// The filter will resume the request later; the id is passed back to
    /// its `cancel` if the request goes away first.
    Pending(PendingId),
}

/// Name and ordering of a registered filter.
pub trait FilterMeta {
    fn name(&self) -> &'static str;

    /// Higher priority runs first.
    fn priority(&self) -> i32 {
        0
    }
}

/// Priority-ordered set of filters. Iteration order is a stable total order
/// on (descending priority, name) so the same set of filters always runs in
/// the same sequence, independent of registration order.
///
/// All mutation happens on the single scheduling thread; the blocking mutex
/// only provides interior mutability.
pub struct FilterRegistry<F: ?Sized + 'static, const N: usize = 8> {
    filters: Mutex<NoopRawMutex, RefCell<Vec<&'static F, N>>>,
}

impl<F: ?Sized + FilterMeta + 'static, const N: usize> FilterRegistry<F, N> {
    pub const fn new() -> Self {
        Self {
            filters: Mutex::new(RefCell::new(Vec::new())),
        }
    }

    /// Insert a filter at its ordering position. Registering the same filter
    /// twice is a no-op.
    pub fn register(&self, filter: &'static F) -> Result<(), Error> {
        self.filters.lock(|f| {
            let mut filters = f.borrow_mut();

            if filters.iter().any(|r| core::ptr::addr_eq(*r, filter)) {
                return Ok(());
            }

            let pos = filters
                .iter()
                .position(|r| {
                    filter.priority() > r.priority()
                        || (filter.priority() == r.priority() && filter.name() < r.name())
                })
                .unwrap_or(filters.len());

            debug!("registering filter {}", filter.name());
            filters.insert(pos, filter).map_err(|_| Error::Capacity)
        })
    }

    /// Remove a filter. Unknown filters are ignored.
    pub fn unregister(&self, filter: &'static F) {
        self.filters.lock(|f| {
            let mut filters = f.borrow_mut();
            if let Some(pos) = filters.iter().position(|r| core::ptr::addr_eq(*r, filter)) {
                debug!("unregistering filter {}", filter.name());
                filters.remove(pos);
            }
        })
    }

    pub fn is_empty(&self) -> bool {
        self.filters.lock(|f| f.borrow().is_empty())
    }

    pub fn len(&self) -> usize {
        self.filters.lock(|f| f.borrow().len())
    }

    /// Filter at the given ordering position, if any.
    pub fn get(&self, index: usize) -> Option<&'static F> {
        self.filters.lock(|f| f.borrow().get(index).copied())
    }
}

impl<F: ?Sized + FilterMeta + 'static, const N: usize> Default for FilterRegistry<F, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Named(&'static str, i32);

    impl FilterMeta for Named {
        fn name(&self) -> &'static str {
            self.0
        }

        fn priority(&self) -> i32 {
            self.1
        }
    }

    fn names<const N: usize>(reg: &FilterRegistry<Named, N>) -> std::vec::Vec<&'static str> {
        (0..reg.len()).map(|i| reg.get(i).unwrap().name()).collect()
    }

    #[test]
    fn ordering_is_priority_then_name() {
        static A: Named = Named("alpha", 1);
        static B: Named = Named("beta", 2);
        static C: Named = Named("charlie", 1);
        static D: Named = Named("delta", 1);

        let reg: FilterRegistry<Named, 8> = FilterRegistry::new();
        reg.register(&D).unwrap();
        reg.register(&B).unwrap();
        reg.register(&C).unwrap();
        reg.register(&A).unwrap();

        assert_eq!(names(&reg), ["beta", "alpha", "charlie", "delta"]);
    }

    #[test]
    fn duplicate_registration_is_noop() {
        static A: Named = Named("alpha", 0);

        let reg: FilterRegistry<Named, 4> = FilterRegistry::new();
        reg.register(&A).unwrap();
        reg.register(&A).unwrap();
        assert_eq!(reg.len(), 1);

        reg.unregister(&A);
        assert!(reg.is_empty());
        reg.unregister(&A);
        assert!(reg.is_empty());
    }

    #[test]
    fn registry_overflow_reports_capacity() {
        static A: Named = Named("a", 0);
        static B: Named = Named("b", 0);

        let reg: FilterRegistry<Named, 1> = FilterRegistry::new();
        reg.register(&A).unwrap();
        assert!(reg.register(&B).is_err());
    }
}

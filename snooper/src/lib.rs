// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/
//
// Copyright 2025 Oxide Computer Company

//! The membership cache of an IGMP snooping engine.
//!
//! The cache tracks which hosts are listening to which multicast groups on
//! which switch ports, which port each host lives on, and which ports have a
//! multicast router attached.  As membership changes, it keeps the switch's
//! per-group forwarding masks up to date through the `aal::AsicOps` driver
//! interface.
//!
//! All of the tables are of fixed size, and are expired by two timers: one
//! sweeping the whole group table, and one tracking the earliest router
//! expiry.  The embedder owns the timer service, and reports expired timers
//! back through `SnoopCache::timer_fired()`.

pub mod config;
pub mod types;

mod cache;
mod groups;
mod hosts;
mod members;
mod membership;
mod table;
mod views;

pub use cache::SnoopCache;
pub use config::Config;
pub use types::SnoopError;
pub use types::SnoopResult;
pub use views::CacheStats;
pub use views::GroupView;
pub use views::MemberView;

#[cfg(test)]
pub(crate) fn test_logger() -> slog::Logger {
    use slog::Drain;

    let dec = slog_term::PlainSyncDecorator::new(slog_term::TestStdoutWriter);
    let drain = slog_term::FullFormat::new(dec).build().fuse();
    slog::Logger::root(drain, slog::o!())
}

#[cfg(test)]
mockall::mock! {
    pub Asic {}
    impl aal::AsicOps for Asic {
        fn mac_port_lookup(
            &self,
            mac: common::network::MacAddr,
        ) -> aal::AsicResult<Option<common::ports::PortNo>>;
        fn mc_portmask_set(
            &self,
            group: common::network::MacAddr,
            mask: common::ports::PortMask,
        ) -> aal::AsicResult<()>;
        fn mc_portmask_clear(
            &self,
            group: common::network::MacAddr,
        ) -> aal::AsicResult<()>;
        fn mc_ports_add(
            &self,
            group: common::network::MacAddr,
            mask: common::ports::PortMask,
        ) -> aal::AsicResult<()>;
        fn mc_ports_remove(
            &self,
            group: common::network::MacAddr,
            mask: common::ports::PortMask,
        ) -> aal::AsicResult<()>;
    }
}

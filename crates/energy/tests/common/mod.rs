//! Shared helpers for integration tests.

#![allow(dead_code)]

use alopex_energy::index::{DateRangeIndex, RangeHandler};
use alopex_energy::model::IdDateRange;
use alopex_energy::{EnergyError, Result};
use chrono::NaiveDate;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Barrier, Mutex};

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

/// In-memory index counting the calls that reach it.
#[derive(Default)]
pub struct CountingIndex {
    ranges: Mutex<BTreeMap<String, IdDateRange>>,
    pub gets: AtomicUsize,
    pub for_each_ids: AtomicUsize,
    pub for_alls: AtomicUsize,
    pub saves: AtomicUsize,
    pub fail_commit: AtomicBool,
}

impl CountingIndex {
    pub fn with_ranges(ranges: &[(&str, NaiveDate, NaiveDate)]) -> Self {
        let index = Self::default();
        {
            let mut map = index.ranges.lock().unwrap();
            for (id, from, to) in ranges {
                map.insert(id.to_string(), IdDateRange::new(*id, *from, *to));
            }
        }
        index
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn saves(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl DateRangeIndex for CountingIndex {
    fn get(&self, id: &str) -> Result<Option<IdDateRange>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        Ok(self.ranges.lock().unwrap().get(id).cloned())
    }

    fn for_each(&self, ids: &[String], handler: &mut RangeHandler<'_>) -> Result<()> {
        self.for_each_ids.fetch_add(ids.len(), Ordering::SeqCst);
        let found: Vec<_> = {
            let map = self.ranges.lock().unwrap();
            ids.iter().filter_map(|id| map.get(id).cloned()).collect()
        };
        found.into_iter().for_each(handler);
        Ok(())
    }

    fn for_all(&self, handler: &mut RangeHandler<'_>) -> Result<()> {
        self.for_alls.fetch_add(1, Ordering::SeqCst);
        let all: Vec<_> = self.ranges.lock().unwrap().values().cloned().collect();
        all.into_iter().for_each(handler);
        Ok(())
    }

    fn save(&self, id: &str, from: NaiveDate, to: NaiveDate) -> Result<()> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.ranges
            .lock()
            .unwrap()
            .insert(id.to_string(), IdDateRange::new(id, from, to));
        Ok(())
    }

    fn commit(&self) -> Result<()> {
        if self.fail_commit.load(Ordering::SeqCst) {
            return Err(EnergyError::Storage("commit refused".to_string()));
        }
        Ok(())
    }

    fn rollback(&self) -> Result<()> {
        Ok(())
    }
}

/// Wraps an index and refuses to commit it.
pub struct FailingCommit<I>(pub I);

impl<I: DateRangeIndex> DateRangeIndex for FailingCommit<I> {
    fn get(&self, id: &str) -> Result<Option<IdDateRange>> {
        self.0.get(id)
    }

    fn for_each(&self, ids: &[String], handler: &mut RangeHandler<'_>) -> Result<()> {
        self.0.for_each(ids, handler)
    }

    fn for_all(&self, handler: &mut RangeHandler<'_>) -> Result<()> {
        self.0.for_all(handler)
    }

    fn save(&self, id: &str, from: NaiveDate, to: NaiveDate) -> Result<()> {
        self.0.save(id, from, to)
    }

    fn commit(&self) -> Result<()> {
        Err(EnergyError::Storage("simulated commit failure".to_string()))
    }

    fn rollback(&self) -> Result<()> {
        self.0.rollback()
    }
}

/// Wraps an index and holds the first `get` between reading the backing
/// range and returning it, until the test has run its interleaved calls.
pub struct PausingGet<I> {
    pub index: I,
    armed: AtomicBool,
    pub read: Barrier,
    pub resume: Barrier,
}

impl<I> PausingGet<I> {
    pub fn new(index: I) -> Self {
        Self {
            index,
            armed: AtomicBool::new(true),
            read: Barrier::new(2),
            resume: Barrier::new(2),
        }
    }
}

impl<I: DateRangeIndex> DateRangeIndex for PausingGet<I> {
    fn get(&self, id: &str) -> Result<Option<IdDateRange>> {
        let range = self.index.get(id)?;
        if self.armed.swap(false, Ordering::SeqCst) {
            self.read.wait();
            self.resume.wait();
        }
        Ok(range)
    }

    fn for_each(&self, ids: &[String], handler: &mut RangeHandler<'_>) -> Result<()> {
        self.index.for_each(ids, handler)
    }

    fn for_all(&self, handler: &mut RangeHandler<'_>) -> Result<()> {
        self.index.for_all(handler)
    }

    fn save(&self, id: &str, from: NaiveDate, to: NaiveDate) -> Result<()> {
        self.index.save(id, from, to)
    }

    fn commit(&self) -> Result<()> {
        self.index.commit()
    }

    fn rollback(&self) -> Result<()> {
        self.index.rollback()
    }
}

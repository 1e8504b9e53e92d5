#![allow(dead_code)]

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use tickbridge::{
    common::Extension,
    host::{MemoryLegacyHost, MemoryRegionHost, Runnable, runnable},
};

pub fn legacy(name: &str) -> (MemoryLegacyHost, Extension) {
    let host = MemoryLegacyHost::new().expect("legacy host");
    let extension = Extension::new(name, Arc::new(host.clone()));
    (host, extension)
}

pub fn regional(name: &str) -> (MemoryRegionHost, Extension) {
    let host = MemoryRegionHost::new().expect("region host");
    let extension = Extension::new(name, Arc::new(host.clone()));
    (host, extension)
}

pub fn counter() -> (Arc<AtomicUsize>, Runnable) {
    let count = Arc::new(AtomicUsize::new(0));
    let body_count = count.clone();
    (
        count,
        runnable(move || {
            body_count.fetch_add(1, Ordering::SeqCst);
        }),
    )
}

pub fn count(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}

//! Documents written by each attempt.

use rand::Rng;
use serde_json::{json, Value};

/// Produces one document per write attempt.
pub trait PayloadFactory: Send + Sync + 'static {
    fn next_document(&self) -> Value;
}

impl<F> PayloadFactory for F
where
    F: Fn() -> Value + Send + Sync + 'static,
{
    fn next_document(&self) -> Value {
        self()
    }
}

const TITLES: &[&str] = &[
    "The Quiet Replica",
    "Partitions of Autumn",
    "A Study in Quorum",
    "Latency and Light",
    "The Last Failover",
];

const AUTHORS: &[&str] = &["A. Okafor", "M. Lindqvist", "R. Tanaka", "S. Moreau", "J. Alvarez"];

/// Small "book" documents with a random 128-bit hex `id`.
#[derive(Clone, Copy, Debug, Default)]
pub struct BookFactory;

impl PayloadFactory for BookFactory {
    fn next_document(&self) -> Value {
        let mut rng = rand::thread_rng();
        let id: u128 = rng.gen();
        json!({
            "id": format!("{id:032x}"),
            "title": TITLES[rng.gen_range(0..TITLES.len())],
            "author": AUTHORS[rng.gen_range(0..AUTHORS.len())],
            "isbn": format!("978-{:010}", rng.gen_range(0..10_000_000_000u64)),
            "pages": rng.gen_range(48..1_200u32),
        })
    }
}

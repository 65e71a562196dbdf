//! Synthetic datasets lifted to cell complexes.

pub mod ring_lookup;

pub use ring_lookup::{
    generate_ring_lookup_dataset, generate_ring_lookup_graph, load_ring_lookup_graphs,
    ring_lookup_complex, RingLookupConfig, RingLookupDataset, RingLookupGraph,
};

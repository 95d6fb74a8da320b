//! Ordered variant catalog for one input file (spec component C3).
//!
//! Grounded on ConSTRain's `karyotype::Karyotype`: a thin immutable wrapper
//! around a lookup structure, built once by the reading layer and queried
//! read-only by the rest of the pipeline.

use std::collections::HashMap;
use std::rc::Rc;

use anyhow::{bail, Result};

use crate::marker::Marker;

/// Immutable, ordered view over the markers read from one input file, with
/// by-identifier and by-position lookup.
#[derive(Debug)]
pub struct MarkerIndex {
    markers: Vec<Rc<Marker>>,
    by_id: HashMap<String, usize>,
    by_pos: HashMap<i64, Vec<usize>>,
}

impl MarkerIndex {
    /// Build an index over `markers`, which must already be in file order.
    /// Fails if two markers in the file share an identifier.
    pub fn build(markers: Vec<Marker>) -> Result<Self> {
        let mut by_id = HashMap::new();
        let mut by_pos: HashMap<i64, Vec<usize>> = HashMap::new();
        let markers: Vec<Rc<Marker>> = markers.into_iter().map(Rc::new).collect();

        for (i, marker) in markers.iter().enumerate() {
            for id in marker.ids() {
                if by_id.insert(id.clone(), i).is_some() {
                    bail!("duplicate identifier '{id}' in input (marker {marker})");
                }
            }
            by_pos.entry(marker.pos()).or_default().push(i);
        }

        Ok(MarkerIndex { markers, by_id, by_pos })
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    pub fn get(&self, i: usize) -> &Rc<Marker> {
        &self.markers[i]
    }

    pub fn iter(&self) -> impl Iterator<Item = (usize, &Rc<Marker>)> {
        self.markers.iter().enumerate()
    }

    /// Index of the unique marker carrying `id`, if any.
    pub fn index_of_id(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Indices of every marker located at `pos`, in file order.
    pub fn at_position(&self, pos: i64) -> &[usize] {
        self.by_pos.get(&pos).map(Vec::as_slice).unwrap_or(&[])
    }
}

//! Work vector pool: per-worker scratch memory for frame analyses
//!
//! A pool holds, for every worker slot, one vector per declaration. In
//! reusable mode all vectors of all slots live in one arena that is
//! allocated up front, so analysing a frame never allocates. In lazy mode
//! every vector is its own `Vec` that is sized on acquisition, for analyses
//! whose scratch sizes are only known per frame.
//!
//! Workers never share a slot: the workspace hands each worker a distinct
//! [`ScratchSlot`], which borrows that slot's memory exclusively.

use crate::{PraatError, Result};

/// A named scratch vector requirement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VectorDeclaration {
    name: String,
    size: usize,
}

impl VectorDeclaration {
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn size(&self) -> usize {
        self.size
    }
}

/// Where a declared vector lives inside a slot's arena region
#[derive(Debug, Clone)]
struct Layout {
    name: String,
    offset: usize,
    size: usize,
}

#[derive(Debug)]
enum Storage {
    /// One contiguous arena, `stride` values per slot
    Reusable { arena: Vec<f64>, stride: usize },
    /// Slot-major vectors, `layout.len()` per slot
    Lazy { vectors: Vec<Vec<f64>> },
}

/// Scratch vectors for every worker slot of an analysis
#[derive(Debug)]
pub struct WorkvectorPool {
    layout: Vec<Layout>,
    number_of_slots: usize,
    storage: Storage,
    /// Current logical length of each vector, slot-major
    lengths: Vec<usize>,
    /// Allocations made while handing out vectors, per slot
    slot_allocations: Vec<usize>,
    /// Allocations made when the pool was built
    initial_allocations: usize,
}

impl WorkvectorPool {
    /// Create a pool for `number_of_slots` workers
    ///
    /// # Arguments
    /// * `declarations` - The vectors every slot needs, in order
    /// * `number_of_slots` - One slot per worker thread
    /// * `reusable` - Preallocate everything now (true) or size vectors on
    ///                acquisition (false)
    ///
    /// # Errors
    /// [`PraatError::DuplicateDeclaration`] if two declarations share a name,
    /// [`PraatError::InvalidParameter`] if there are no slots,
    /// [`PraatError::OutOfMemory`] if a reusable arena cannot be allocated.
    pub fn new(declarations: &[VectorDeclaration], number_of_slots: usize, reusable: bool) -> Result<Self> {
        if number_of_slots == 0 {
            return Err(PraatError::InvalidParameter(
                "a work vector pool needs at least one slot".to_string(),
            ));
        }

        let mut layout: Vec<Layout> = Vec::with_capacity(declarations.len());
        let mut offset = 0usize;
        for declaration in declarations {
            if layout.iter().any(|l| l.name == declaration.name) {
                return Err(PraatError::DuplicateDeclaration(declaration.name.clone()));
            }
            layout.push(Layout {
                name: declaration.name.clone(),
                offset,
                size: declaration.size,
            });
            offset = offset.checked_add(declaration.size).ok_or_else(|| {
                PraatError::OutOfMemory(format!("scratch vector {} does not fit in a slot", declaration.name))
            })?;
        }
        let stride = offset;

        let (storage, initial_allocations) = if reusable {
            let total = stride.checked_mul(number_of_slots).ok_or_else(|| {
                PraatError::OutOfMemory(format!("{} slots of {} scratch values", number_of_slots, stride))
            })?;
            let arena = try_zeroed(total, "scratch arena")?;
            let allocations = usize::from(!arena.is_empty());
            (Storage::Reusable { arena, stride }, allocations)
        } else {
            let vectors = (0..layout.len() * number_of_slots).map(|_| Vec::new()).collect();
            (Storage::Lazy { vectors }, 0)
        };

        let lengths = (0..number_of_slots)
            .flat_map(|_| layout.iter().map(|l| l.size))
            .collect();

        Ok(Self {
            layout,
            number_of_slots,
            storage,
            lengths,
            slot_allocations: vec![0; number_of_slots],
            initial_allocations,
        })
    }

    pub fn number_of_slots(&self) -> usize {
        self.number_of_slots
    }

    pub fn is_reusable(&self) -> bool {
        matches!(self.storage, Storage::Reusable { .. })
    }

    /// Declared (name, size) pairs, in declaration order
    pub fn declarations(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.layout.iter().map(|l| (l.name.as_str(), l.size))
    }

    /// Declared size of a vector
    pub fn declared_size(&self, name: &str) -> Result<usize> {
        self.layout
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.size)
            .ok_or_else(|| PraatError::UnknownDeclaration(name.to_string()))
    }

    /// Check that this pool can serve `declarations`
    ///
    /// In reusable mode every requested vector must fit in its declared size;
    /// lazy pools only need the names.
    pub fn check_declarations(&self, declarations: &[VectorDeclaration]) -> Result<()> {
        for declaration in declarations {
            let capacity = self.declared_size(&declaration.name)?;
            if self.is_reusable() && declaration.size > capacity {
                return Err(PraatError::ScratchTooSmall {
                    name: declaration.name.clone(),
                    requested: declaration.size,
                    capacity,
                });
            }
        }
        Ok(())
    }

    /// Number of heap allocations the pool has made so far
    ///
    /// A reusable pool allocates once, when it is built; a lazy pool counts
    /// every time a vector had to grow.
    pub fn allocations(&self) -> usize {
        self.initial_allocations + self.slot_allocations.iter().sum::<usize>()
    }

    /// Total scratch values held by the pool
    pub fn capacity(&self) -> usize {
        match &self.storage {
            Storage::Reusable { arena, .. } => arena.len(),
            Storage::Lazy { vectors } => vectors.iter().map(Vec::capacity).sum(),
        }
    }

    /// Borrow the vector `name` of slot `slot`
    ///
    /// The contents are whatever the previous user of the slot left behind;
    /// vectors are never zeroed between frames.
    pub fn acquire(&mut self, slot: usize, name: &str) -> Result<&mut [f64]> {
        self.slot(slot)?.into_vector(name)
    }

    /// Borrow one slot exclusively
    pub fn slot(&mut self, slot: usize) -> Result<ScratchSlot<'_>> {
        let slots = self.number_of_slots;
        if slot >= slots {
            return Err(PraatError::SlotOutOfRange { slot, slots });
        }
        self.slots_mut()
            .into_iter()
            .nth(slot)
            .ok_or(PraatError::SlotOutOfRange { slot, slots })
    }

    /// Split the pool into one exclusive handle per slot, in slot order
    pub fn slots_mut(&mut self) -> Vec<ScratchSlot<'_>> {
        let ndecl = self.layout.len();
        let layout = self.layout.as_slice();
        let mut lengths = self.lengths.as_mut_slice();
        let mut allocations = self.slot_allocations.iter_mut();

        let mut slots = Vec::with_capacity(self.number_of_slots);
        match &mut self.storage {
            Storage::Reusable { arena, stride } => {
                let mut rest = arena.as_mut_slice();
                for index in 0..self.number_of_slots {
                    let (region, tail) = std::mem::take(&mut rest).split_at_mut(*stride);
                    rest = tail;
                    let (slot_lengths, tail) = std::mem::take(&mut lengths).split_at_mut(ndecl);
                    lengths = tail;
                    if let Some(counter) = allocations.next() {
                        slots.push(ScratchSlot {
                            index,
                            layout,
                            store: SlotStore::Arena(region),
                            lengths: slot_lengths,
                            allocations: counter,
                        });
                    }
                }
            }
            Storage::Lazy { vectors } => {
                let mut rest = vectors.as_mut_slice();
                for index in 0..self.number_of_slots {
                    let (slot_vectors, tail) = std::mem::take(&mut rest).split_at_mut(ndecl);
                    rest = tail;
                    let (slot_lengths, tail) = std::mem::take(&mut lengths).split_at_mut(ndecl);
                    lengths = tail;
                    if let Some(counter) = allocations.next() {
                        slots.push(ScratchSlot {
                            index,
                            layout,
                            store: SlotStore::Lazy(slot_vectors),
                            lengths: slot_lengths,
                            allocations: counter,
                        });
                    }
                }
            }
        }
        slots
    }
}

enum SlotStore<'a> {
    Arena(&'a mut [f64]),
    Lazy(&'a mut [Vec<f64>]),
}

/// Exclusive access to the scratch vectors of one worker slot
pub struct ScratchSlot<'a> {
    index: usize,
    layout: &'a [Layout],
    store: SlotStore<'a>,
    lengths: &'a mut [usize],
    allocations: &'a mut usize,
}

impl<'a> ScratchSlot<'a> {
    /// Slot number within the pool
    pub fn index(&self) -> usize {
        self.index
    }

    fn position(&self, name: &str) -> Result<usize> {
        self.layout
            .iter()
            .position(|l| l.name == name)
            .ok_or_else(|| PraatError::UnknownDeclaration(name.to_string()))
    }

    /// Current length of vector `name`
    pub fn len(&self, name: &str) -> Result<usize> {
        Ok(self.lengths[self.position(name)?])
    }

    /// Set the length that subsequent acquisitions of `name` will have
    ///
    /// A reusable slot cannot grow past the declared size; a lazy slot grows
    /// its vector, allocating if needed.
    pub fn resize(&mut self, name: &str, len: usize) -> Result<()> {
        let idecl = self.position(name)?;
        if let SlotStore::Arena(_) = self.store {
            let capacity = self.layout[idecl].size;
            if len > capacity {
                return Err(PraatError::ScratchTooSmall {
                    name: name.to_string(),
                    requested: len,
                    capacity,
                });
            }
        }
        self.lengths[idecl] = len;
        Ok(())
    }

    /// Borrow vector `name`
    pub fn vector(&mut self, name: &str) -> Result<&mut [f64]> {
        self.reborrow().into_vector(name)
    }

    /// Resize vector `name` to `len` and borrow it
    pub fn vector_sized(&mut self, name: &str, len: usize) -> Result<&mut [f64]> {
        self.resize(name, len)?;
        self.vector(name)
    }

    /// Borrow several distinct vectors at once
    ///
    /// # Example
    /// ```
    /// use praatfan_workspace::{VectorDeclaration, WorkvectorPool};
    ///
    /// let declarations = [VectorDeclaration::new("forward", 8), VectorDeclaration::new("backward", 8)];
    /// let mut pool = WorkvectorPool::new(&declarations, 2, true).unwrap();
    /// let mut slot = pool.slot(1).unwrap();
    /// let [forward, backward] = slot.vectors(["forward", "backward"]).unwrap();
    /// forward.copy_from_slice(backward);
    /// ```
    pub fn vectors<const N: usize>(&mut self, names: [&str; N]) -> Result<[&mut [f64]; N]> {
        self.reborrow().into_vectors(names)
    }

    /// Consume the handle, keeping a borrow of vector `name`
    pub fn into_vector(self, name: &str) -> Result<&'a mut [f64]> {
        let idecl = self.position(name)?;
        let len = self.lengths[idecl];
        match self.store {
            SlotStore::Arena(region) => {
                let offset = self.layout[idecl].offset;
                Ok(&mut region[offset..offset + len])
            }
            SlotStore::Lazy(vectors) => {
                let vector = &mut vectors[idecl];
                size_lazy(vector, len, self.allocations)?;
                Ok(vector.as_mut_slice())
            }
        }
    }

    /// Consume the handle, keeping borrows of several distinct vectors
    pub fn into_vectors<const N: usize>(self, names: [&str; N]) -> Result<[&'a mut [f64]; N]> {
        let mut positions = [0usize; N];
        for (j, name) in names.iter().enumerate() {
            let idecl = self.position(name)?;
            if positions[..j].contains(&idecl) {
                return Err(PraatError::DuplicateDeclaration(name.to_string()));
            }
            positions[j] = idecl;
        }

        let mut out: [Option<&'a mut [f64]>; N] = std::array::from_fn(|_| None);
        match self.store {
            SlotStore::Arena(region) => {
                let mut rest = region;
                for (idecl, layout) in self.layout.iter().enumerate() {
                    let (head, tail) = std::mem::take(&mut rest).split_at_mut(layout.size);
                    rest = tail;
                    if let Some(j) = positions.iter().position(|&p| p == idecl) {
                        out[j] = Some(&mut head[..self.lengths[idecl]]);
                    }
                }
            }
            SlotStore::Lazy(vectors) => {
                for (idecl, vector) in vectors.iter_mut().enumerate() {
                    if let Some(j) = positions.iter().position(|&p| p == idecl) {
                        size_lazy(vector, self.lengths[idecl], self.allocations)?;
                        out[j] = Some(vector.as_mut_slice());
                    }
                }
            }
        }
        Ok(out.map(Option::unwrap_or_default))
    }

    fn reborrow(&mut self) -> ScratchSlot<'_> {
        ScratchSlot {
            index: self.index,
            layout: self.layout,
            store: match &mut self.store {
                SlotStore::Arena(region) => SlotStore::Arena(&mut **region),
                SlotStore::Lazy(vectors) => SlotStore::Lazy(&mut **vectors),
            },
            lengths: &mut *self.lengths,
            allocations: &mut *self.allocations,
        }
    }
}

/// Give a lazy vector length `len`, counting growth of its buffer
fn size_lazy(vector: &mut Vec<f64>, len: usize, allocations: &mut usize) -> Result<()> {
    if len > vector.capacity() {
        vector
            .try_reserve_exact(len - vector.len())
            .map_err(|e| PraatError::OutOfMemory(format!("scratch vector of {} values: {}", len, e)))?;
        *allocations += 1;
    }
    vector.resize(len, 0.0);
    Ok(())
}

/// Allocate `len` zeroed values, reporting failure instead of aborting
pub(crate) fn try_zeroed(len: usize, what: &str) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    values
        .try_reserve_exact(len)
        .map_err(|e| PraatError::OutOfMemory(format!("{} of {} values: {}", what, len, e)))?;
    values.resize(len, 0.0);
    Ok(values)
}

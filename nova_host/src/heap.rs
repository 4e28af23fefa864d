// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub mod indexes;

#[cfg(feature = "agent")]
use core::ops::{Index, IndexMut};

#[cfg(feature = "agent")]
use ahash::RandomState;
#[cfg(feature = "agent")]
use hashbrown::HashMap;
#[cfg(feature = "agent")]
use wtf8::Wtf8Buf;

#[cfg(feature = "agent")]
use crate::{
    agent::{Atom, Object, Value},
    engine::{ClassId, OpaqueLink},
};

/// Allocates `T` in the heap and hands back its handle `F`.
#[cfg(feature = "agent")]
pub trait CreateHeapData<T, F> {
    fn create(&mut self, data: T) -> F;
}

#[cfg(feature = "agent")]
#[derive(Debug, Default)]
pub struct ObjectHeapData {
    /// `None` for ordinary objects.
    pub(crate) class_id: Option<ClassId>,
    /// Present on class instances only.
    pub(crate) opaque: Option<OpaqueLink>,
    pub(crate) properties: Vec<(Atom, Value)>,
}

#[cfg(feature = "agent")]
impl ObjectHeapData {
    pub(crate) fn ordinary() -> Self {
        Self::default()
    }

    pub(crate) fn instance(class_id: ClassId) -> Self {
        Self {
            class_id: Some(class_id),
            opaque: Some(OpaqueLink::EMPTY),
            properties: Vec::new(),
        }
    }

    pub(crate) fn get(&self, name: Atom) -> Option<&Value> {
        self.properties
            .iter()
            .find_map(|(key, value)| (*key == name).then_some(value))
    }

    pub(crate) fn set(&mut self, name: Atom, value: Value) {
        match self.properties.iter_mut().find(|(key, _)| *key == name) {
            Some((_, slot)) => *slot = value,
            None => self.properties.push((name, value)),
        }
    }
}

#[cfg(feature = "agent")]
#[derive(Debug)]
pub struct AtomHeapData {
    pub(crate) data: Wtf8Buf,
}

#[cfg(feature = "agent")]
#[derive(Debug, Default)]
pub struct Heap {
    pub(crate) objects: Vec<Option<ObjectHeapData>>,
    pub(crate) atoms: Vec<Option<AtomHeapData>>,
    atom_lookup: HashMap<Box<str>, Atom, RandomState>,
}

#[cfg(feature = "agent")]
impl CreateHeapData<ObjectHeapData, Object> for Heap {
    fn create(&mut self, data: ObjectHeapData) -> Object {
        self.objects.push(Some(data));
        Object(indexes::ObjectIndex::last(&self.objects))
    }
}

#[cfg(feature = "agent")]
impl Heap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the atom for `name`, interning it on first use.
    pub(crate) fn intern(&mut self, name: &str) -> Atom {
        if let Some(atom) = self.atom_lookup.get(name) {
            return *atom;
        }
        self.atoms.push(Some(AtomHeapData {
            data: Wtf8Buf::from_str(name),
        }));
        let atom = Atom(indexes::AtomIndex::last(&self.atoms));
        self.atom_lookup.insert(name.into(), atom);
        atom
    }

    pub(crate) fn atom_to_string(&self, atom: Atom) -> String {
        self.atoms
            .get(atom.0.into_index())
            .and_then(Option::as_ref)
            .map(|atom| atom.data.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub(crate) fn object(&self, object: Object) -> Option<&ObjectHeapData> {
        self.objects.get(object.0.into_index())?.as_ref()
    }

    pub(crate) fn object_mut(&mut self, object: Object) -> Option<&mut ObjectHeapData> {
        self.objects.get_mut(object.0.into_index())?.as_mut()
    }

    pub(crate) fn is_live(&self, object: Object) -> bool {
        self.object(object).is_some()
    }

    /// Marks every object reachable from `roots` through ordinary properties
    /// and returns the live objects that were not reached.
    pub(crate) fn unreachable_objects(&self, roots: &[Value]) -> Vec<Object> {
        let mut marks = vec![false; self.objects.len()].into_boxed_slice();
        let mut queue: Vec<Object> = roots.iter().filter_map(Value::as_object).collect();
        while let Some(object) = queue.pop() {
            let index = object.0.into_index();
            let Some(Some(data)) = self.objects.get(index) else {
                continue;
            };
            if marks[index] {
                continue;
            }
            marks[index] = true;
            queue.extend(data.properties.iter().filter_map(|(_, value)| value.as_object()));
        }
        self.objects
            .iter()
            .enumerate()
            .filter(|(index, data)| data.is_some() && !marks[*index])
            .map(|(index, _)| Object(indexes::ObjectIndex::from_index(index)))
            .collect()
    }

    /// Releases the slot of `object`.
    pub(crate) fn sweep(&mut self, object: Object) {
        if let Some(slot) = self.objects.get_mut(object.0.into_index()) {
            *slot = None;
        }
    }
}

#[cfg(feature = "agent")]
impl Index<Object> for Heap {
    type Output = ObjectHeapData;

    fn index(&self, index: Object) -> &Self::Output {
        self.objects
            .get(index.0.into_index())
            .expect("Object out of bounds")
            .as_ref()
            .expect("Object slot empty")
    }
}

#[cfg(feature = "agent")]
impl IndexMut<Object> for Heap {
    fn index_mut(&mut self, index: Object) -> &mut Self::Output {
        self.objects
            .get_mut(index.0.into_index())
            .expect("Object out of bounds")
            .as_mut()
            .expect("Object slot empty")
    }
}

#[cfg(all(test, feature = "agent"))]
mod tests {
    use super::*;

    #[test]
    fn atoms_are_interned() {
        let mut heap = Heap::new();
        let a = heap.intern("length");
        let b = heap.intern("name");
        assert_ne!(a, b);
        assert_eq!(heap.intern("length"), a);
        assert_eq!(heap.atom_to_string(b), "name");
        assert_eq!(heap.atoms.len(), 2);
    }

    #[test]
    fn unreachable_objects_are_found() {
        let mut heap = Heap::new();
        let key = heap.intern("child");
        let root = heap.create(ObjectHeapData::ordinary());
        let child = heap.create(ObjectHeapData::ordinary());
        let orphan = heap.create(ObjectHeapData::ordinary());
        heap[root].set(key, Value::Object(child));
        // Cycles terminate.
        heap[child].set(key, Value::Object(root));

        let dead = heap.unreachable_objects(&[Value::Object(root)]);
        assert_eq!(dead, vec![orphan]);

        heap.sweep(orphan);
        assert!(!heap.is_live(orphan));
        assert!(heap.is_live(child));
        assert_eq!(heap.unreachable_objects(&[]), vec![root, child]);
    }

    #[test]
    fn properties_overwrite_in_place() {
        let mut heap = Heap::new();
        let x = heap.intern("x");
        let y = heap.intern("y");
        let object = heap.create(ObjectHeapData::ordinary());
        heap[object].set(x, Value::from(1.0));
        heap[object].set(y, Value::from(2.0));
        heap[object].set(x, Value::from(3.0));
        assert_eq!(heap[object].properties.len(), 2);
        assert_eq!(heap[object].get(x), Some(&Value::from(3.0)));
        let z = heap.intern("z");
        assert_eq!(heap[object].get(z), None);
    }
}

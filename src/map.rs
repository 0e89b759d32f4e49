// String-keyed hash map with separate chaining.
//
// The bucket count is fixed at construction; callers size for their
// expected population. Iteration order follows the buckets and is
// not insertion order.

const DEFAULT_BUCKETS: usize = 32;

struct Entry<V> {
    key: String,
    value: V,
}

pub struct Map<V> {
    buckets: Vec<Vec<Entry<V>>>,
    len: usize,
}

// djb2: seed 5381, then hash * 33 + byte.
fn hash(key: &str) -> u64 {
    key.bytes().fold(5381u64, |h, b| {
        h.wrapping_shl(5).wrapping_add(h).wrapping_add(u64::from(b))
    })
}

impl<V> Map<V> {
    pub fn new() -> Map<V> {
        Map::with_buckets(DEFAULT_BUCKETS)
    }

    pub fn with_buckets(buckets: usize) -> Map<V> {
        let buckets = buckets.max(1);
        Map {
            buckets: (0..buckets).map(|_| Vec::new()).collect(),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn bucket(&self, key: &str) -> usize {
        (hash(key) % self.buckets.len() as u64) as usize
    }

    // Insert or replace. Returns the previous value when the key was
    // already present.
    pub fn put(&mut self, key: &str, value: V) -> Option<V> {
        let index = self.bucket(key);
        let chain = &mut self.buckets[index];

        for entry in chain.iter_mut() {
            if entry.key == key {
                return Some(std::mem::replace(&mut entry.value, value));
            }
        }

        chain.push(Entry { key: key.to_string(), value });
        self.len += 1;
        None
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.buckets[self.bucket(key)]
            .iter()
            .find(|entry| entry.key == key)
            .map(|entry| &entry.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    // Removing an absent key is not an error.
    pub fn remove(&mut self, key: &str) -> Option<V> {
        let index = self.bucket(key);
        let chain = &mut self.buckets[index];
        let position = chain.iter().position(|entry| entry.key == key)?;
        self.len -= 1;
        Some(chain.remove(position).value)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &V)> {
        self.buckets
            .iter()
            .flat_map(|chain| chain.iter().map(|entry| (entry.key.as_str(), &entry.value)))
    }
}

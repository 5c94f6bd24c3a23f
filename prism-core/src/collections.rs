pub use smallvec::{smallvec, SmallVec};

pub mod hashmap {
    pub use hashbrown::hash_map::{Entry, HashMap};
}

pub mod hashset {
    pub use hashbrown::HashSet;
}

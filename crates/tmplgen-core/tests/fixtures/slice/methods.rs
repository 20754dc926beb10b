impl Ts {
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn get(&self, idx: usize) -> Option<T> {
        self.0.get(idx).copied()
    }
}

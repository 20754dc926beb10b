//! Growable sequence of `T`.

pub type T = i64;

pub struct Ts(pub Vec<T>);

impl Ts {
    pub fn new() -> Self {
        Ts(Vec::new())
    }

    pub fn push(&mut self, value: T) {
        self.0.push(value);
    }

    pub fn first(&self) -> Option<&T> {
        self.0.first()
    }
}

impl std::fmt::Debug for Ts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Collects `values` into a new sequence.
pub fn foo(values: &[T]) -> Ts {
    let mut out = Ts::new();
    for v in values {
        out.push(v.clone());
    }
    out
}

#![allow(non_snake_case)]

pub type T = u8;

pub struct Ts(Vec<T>);

impl Ts {
    pub fn Foo(&self) -> usize {
        baz(self.0.len())
    }

    pub fn Bar(&self) {}
}

pub fn Foo() -> Ts {
    Ts(Vec::new())
}

fn baz(n: usize) -> usize {
    n
}

fn unused() {}

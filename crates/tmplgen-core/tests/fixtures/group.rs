use std::cell::Cell;

thread_local! {
    pub static X: Cell<u8> = Cell::new(0);
    pub static Y: Cell<u8> = Cell::new(1);
}

pub fn bump() -> u8 {
    Y.with(|y| {
        y.set(y.get() + 1);
        y.get()
    })
}

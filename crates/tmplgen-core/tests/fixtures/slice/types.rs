pub type T = u8;

pub struct Ts(pub Vec<T>);

pub const N: usize = 0;

pub const LIMIT: u8 = 3;

pub fn describe(x: u8) -> String {
    format!("{x} of {N}, limit {LIMIT:?}")
}

pub fn unrelated() {}

pub const N: usize = 0;

pub const NAME: &str = "";

pub fn describe() -> String {
    format!("{}:{}", NAME, N)
}

pub fn buffer() -> [u8; N] {
    [0; N]
}

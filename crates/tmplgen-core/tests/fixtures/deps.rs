pub fn a() -> u32 {
    b() + 1
}

fn b() -> u32 {
    C * 2
}

const C: u32 = 21;

pub fn d() -> u32 {
    0
}

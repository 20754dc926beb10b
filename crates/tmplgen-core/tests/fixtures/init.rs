const _: () = {
    let _ = 42;
};

pub fn f() {}

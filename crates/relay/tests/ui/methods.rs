use relay::{Args, Method, Tracked, receiver};

struct Counter {
    step: u64,
}

impl Counter {
    #[receiver]
    fn advance(&self, from: u64) -> u64 {
        from + self.step
    }

    #[receiver]
    pub fn inspect(&self, args: &Args) -> usize {
        args.positional().len()
    }
}

fn main() {
    let counter = Tracked::new(Counter { step: 2 });
    let advance: Method = Counter::advance_receiver(&counter);
    let inspect: Method = Counter::inspect_receiver(&counter);

    assert_eq!(counter.advance(1), 3);
    assert!(advance.signature().is_bound());
    assert!(inspect.signature().is_variadic_named());
}

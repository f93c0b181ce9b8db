use std::error::Error;

fn main() -> Result<(), Box<dyn Error>> {
    slicecache::example_apps::run_cache_walkthrough(std::env::args().skip(1))
}

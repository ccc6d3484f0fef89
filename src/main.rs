fn main() -> anyhow::Result<()> {
    wakegate::run()
}

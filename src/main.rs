fn main() -> anyhow::Result<()> {
    invoice_builder_lib::run()
}

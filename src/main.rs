fn main() -> anyhow::Result<()> {
    kiosk_pos_lib::run()
}

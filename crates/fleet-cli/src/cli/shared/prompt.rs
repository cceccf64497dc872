use super::*;

/// Asks once on stdin. Without a terminal the answer is no; `--yes` is the
/// non-interactive override.
pub(in crate::cli) fn confirm(lines: &[String]) -> bool {
    if !stdin_is_tty() {
        warn!("stdin is not a terminal; declining (pass --yes to proceed)");
        return false;
    }
    let stdin = io::stdin();
    confirm_with(lines, &mut stdin.lock(), &mut io::stdout()).unwrap_or(false)
}

pub(in crate::cli) fn confirm_with(
    lines: &[String],
    input: &mut dyn BufRead,
    out: &mut dyn Write,
) -> io::Result<bool> {
    writeln!(out, "The following repositories will be changed:")?;
    for line in lines {
        writeln!(out, "  {line}")?;
    }
    loop {
        write!(out, "Proceed? [y/N] ")?;
        out.flush()?;
        let mut answer = String::new();
        if input.read_line(&mut answer)? == 0 {
            return Ok(false);
        }
        match answer.trim().to_lowercase().as_str() {
            "y" | "yes" => return Ok(true),
            "" | "n" | "no" => return Ok(false),
            _ => writeln!(out, "Please enter y or n.")?,
        }
    }
}

use super::*;

/// Terminal element writing each record as one delimited line.
pub struct OutputElement {
    name: String,
    writer: Box<dyn Write + Send>,
    delimiter: char,
    written: u64,
    state: ElementState,
}

impl OutputElement {
    pub fn new(name: impl Into<String>, writer: Box<dyn Write + Send>, delimiter: char) -> Self {
        Self {
            name: name.into(),
            writer,
            delimiter,
            written: 0,
            state: ElementState::Created,
        }
    }

    /// Lines written so far.
    pub fn written(&self) -> u64 {
        self.written
    }
}

impl FlowElement for OutputElement {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&mut self) -> FlowResult<()> {
        self.state.ensure_accepting(&self.name)?;
        self.state = ElementState::Open;
        Ok(())
    }

    fn take_event(&mut self, element: StreamElement<Event>) -> FlowResult<()> {
        self.state.ensure_accepting(&self.name)?;
        match element {
            StreamElement::Record(event) => {
                writeln!(self.writer, "{}", event.to_delimited(self.delimiter))?;
                self.written += 1;
            }
            StreamElement::Watermark(_) => {}
            StreamElement::End => self.writer.flush()?,
        }
        Ok(())
    }

    fn close(&mut self) -> FlowResult<()> {
        if self.state == ElementState::Closed {
            return Ok(());
        }
        self.state = ElementState::Closed;
        self.writer.flush()?;
        Ok(())
    }
}
